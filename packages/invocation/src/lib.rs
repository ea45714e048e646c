// ABOUTME: Invocation pipeline for fnbox: fetch an artifact, run it in a sandbox, clean up
// ABOUTME: Owns workspace allocation, admission control, outcome classification and orphan sweeping

pub mod error;
pub mod pipeline;
pub mod types;
pub mod workspace;

pub use error::{Result, WorkspaceError};
pub use pipeline::InvocationPipeline;
pub use types::{ExecutionResult, InvocationReport, InvocationRequest, InvocationState, Outcome};
pub use workspace::{start_sweep_task, Workspace, WorkspaceManager, WORKSPACE_PREFIX};
