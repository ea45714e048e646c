// ABOUTME: Sandbox runner adapters for executing a command against a read-only workspace
// ABOUTME: Exposes the SandboxRunner capability and the Docker-backed implementation

pub mod providers;

pub use providers::{
    CapturedOutput, DockerRunner, ManagedContainer, Result, RunSpec, RunnerError, SandboxRunner,
};
