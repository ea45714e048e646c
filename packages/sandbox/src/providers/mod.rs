// ABOUTME: SandboxRunner trait and run types shared by execution backends
// ABOUTME: Defines the run request, captured output and typed failures with partial output

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod docker;

pub use docker::{DockerRunner, ManagedContainer};

/// Output captured from one sandbox run, one buffer per stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Sandbox engine not available: {0}")]
    Unavailable(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Command exited with status {exit_code}")]
    NonZeroExit {
        exit_code: i64,
        output: CapturedOutput,
    },

    #[error("Sandbox engine error: {message}")]
    Engine {
        message: String,
        output: CapturedOutput,
    },

    #[error("Execution timed out after {} seconds", .after.as_secs())]
    Timeout {
        after: Duration,
        output: CapturedOutput,
    },
}

impl RunnerError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
            output: CapturedOutput::default(),
        }
    }

    /// Output captured before the failure, if the run got that far
    pub fn partial_output(&self) -> Option<&CapturedOutput> {
        match self {
            RunnerError::NonZeroExit { output, .. }
            | RunnerError::Engine { output, .. }
            | RunnerError::Timeout { output, .. } => Some(output),
            RunnerError::Unavailable(_) | RunnerError::ImageNotFound(_) => None,
        }
    }

    /// Move the captured output out of the error
    pub fn into_partial_output(self) -> CapturedOutput {
        match self {
            RunnerError::NonZeroExit { output, .. }
            | RunnerError::Engine { output, .. }
            | RunnerError::Timeout { output, .. } => output,
            RunnerError::Unavailable(_) | RunnerError::ImageNotFound(_) => {
                CapturedOutput::default()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// One sandboxed execution request
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Correlates the sandbox instance with its invocation (labels, names)
    pub run_id: String,
    pub image: String,
    pub command: Vec<String>,
    /// Host directory mounted read-only at the sandbox mount path
    pub mount_source: PathBuf,
    /// Forced teardown after this long; `None` waits for natural completion
    pub deadline: Option<Duration>,
}

/// Capability to execute a command against a read-only mount in an
/// isolated, ephemeral environment.
///
/// `run` blocks until the sandbox instance terminates and guarantees the
/// instance is released before returning, whatever the result.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Short engine identifier used in logs and health output
    fn engine_name(&self) -> &'static str;

    /// Check whether the engine is reachable
    async fn is_available(&self) -> bool;

    /// Run the command. Exit status zero yields the captured output; any
    /// other result is a typed failure carrying whatever output was captured.
    async fn run(&self, spec: &RunSpec) -> Result<CapturedOutput>;
}
