// ABOUTME: Invocation request, state machine states, outcome classification and reports
// ABOUTME: Stage errors from the store, runner and workspace map into a single Outcome taxonomy

use fnbox_config::constants::ENTRYPOINT_FILE_NAME;
use fnbox_config::{SandboxConfig, StoreConfig};
use fnbox_sandbox::{CapturedOutput, RunnerError};
use fnbox_storage::StoreError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::WorkspaceError;

/// A validated request to execute one stored artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub artifact_key: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    /// File name the artifact is staged under; the command expects it there
    pub entrypoint: String,
}

impl InvocationRequest {
    pub fn new(
        artifact_key: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
        command: Vec<String>,
    ) -> Self {
        Self {
            artifact_key: artifact_key.into(),
            namespace: namespace.into(),
            image: image.into(),
            command,
            entrypoint: ENTRYPOINT_FILE_NAME.to_string(),
        }
    }

    /// Request for `artifact_key` using the configured namespace, image and command
    pub fn from_config(
        artifact_key: impl Into<String>,
        store: &StoreConfig,
        sandbox: &SandboxConfig,
    ) -> Self {
        Self::new(
            artifact_key,
            store.namespace.clone(),
            sandbox.image.clone(),
            sandbox.command.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Received,
    Fetching,
    Staged,
    Running,
    Captured,
    CleaningUp,
    Completed,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InvocationState::Completed | InvocationState::Failed)
    }
}

/// Classification attached to every finished invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The artifact key does not exist in the namespace
    NotFound { key: String },
    TransientStoreError(String),
    ImageNotFound(String),
    /// Non-zero exit or engine-reported execution error
    SandboxFailure {
        reason: String,
        exit_code: Option<i64>,
    },
    Timeout { after: Duration },
    ResourceExhausted(String),
    ServiceUnavailable(String),
    UnexpectedError(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::NotFound { .. } => "NOT_FOUND",
            Outcome::TransientStoreError(_) => "TRANSIENT_STORE_ERROR",
            Outcome::ImageNotFound(_) => "IMAGE_NOT_FOUND",
            Outcome::SandboxFailure { .. } => "SANDBOX_FAILURE",
            Outcome::Timeout { .. } => "TIMEOUT",
            Outcome::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Outcome::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Outcome::UnexpectedError(_) => "UNEXPECTED_ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "Execution completed"),
            Outcome::NotFound { key } => write!(f, "Artifact '{}' not found", key),
            Outcome::TransientStoreError(msg) => write!(f, "Artifact store error: {}", msg),
            Outcome::ImageNotFound(image) => write!(f, "Image not found: {}", image),
            Outcome::SandboxFailure { reason, .. } => write!(f, "Sandbox failure: {}", reason),
            Outcome::Timeout { after } => {
                write!(f, "Execution timed out after {} seconds", after.as_secs())
            }
            Outcome::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            Outcome::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            Outcome::UnexpectedError(msg) => write!(f, "Unexpected error: {}", msg),
        }
    }
}

impl From<StoreError> for Outcome {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key, .. } => Outcome::NotFound { key },
            StoreError::TransientError(msg) => Outcome::TransientStoreError(msg),
            StoreError::InvalidArtifact(msg) => Outcome::UnexpectedError(msg),
        }
    }
}

impl From<&RunnerError> for Outcome {
    fn from(err: &RunnerError) -> Self {
        match err {
            RunnerError::Unavailable(msg) => Outcome::ServiceUnavailable(msg.clone()),
            RunnerError::ImageNotFound(image) => Outcome::ImageNotFound(image.clone()),
            RunnerError::NonZeroExit { exit_code, .. } => Outcome::SandboxFailure {
                reason: format!("command exited with status {}", exit_code),
                exit_code: Some(*exit_code),
            },
            RunnerError::Engine { message, .. } => Outcome::SandboxFailure {
                reason: message.clone(),
                exit_code: None,
            },
            RunnerError::Timeout { after, .. } => Outcome::Timeout { after: *after },
        }
    }
}

impl From<&WorkspaceError> for Outcome {
    fn from(err: &WorkspaceError) -> Self {
        if err.is_exhausted() {
            Outcome::ResourceExhausted(err.to_string())
        } else {
            Outcome::UnexpectedError(err.to_string())
        }
    }
}

/// Captured output and classification of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn new(outcome: Outcome, output: CapturedOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            outcome,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Everything known about a finished invocation
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub invocation_id: String,
    pub result: ExecutionResult,
    /// States visited, in order, ending in a terminal state
    pub states: Vec<InvocationState>,
    /// Workspace used by the invocation, if one was allocated
    pub workspace_root: Option<PathBuf>,
}

impl InvocationReport {
    pub fn final_state(&self) -> InvocationState {
        self.states
            .last()
            .copied()
            .unwrap_or(InvocationState::Failed)
    }

    pub fn is_completed(&self) -> bool {
        self.final_state() == InvocationState::Completed
    }

    pub fn reached(&self, state: InvocationState) -> bool {
        self.states.contains(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_out_of_space_workspace_is_resource_exhausted() {
        let full = WorkspaceError::from_io(
            "/tmp/fnbox/faas_code_abc/script.py",
            std::io::Error::from_raw_os_error(28),
        );
        let outcome = Outcome::from(&full);

        assert!(matches!(outcome, Outcome::ResourceExhausted(_)));
        assert_eq!(outcome.code(), "RESOURCE_EXHAUSTED");

        let denied = WorkspaceError::from_io(
            "/tmp/fnbox",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(Outcome::from(&denied).code(), "UNEXPECTED_ERROR");
    }

    #[test]
    fn test_store_errors_classify() {
        assert_eq!(
            Outcome::from(StoreError::not_found("faas-code", "a.py")),
            Outcome::NotFound {
                key: "a.py".to_string()
            }
        );
        assert_eq!(
            Outcome::from(StoreError::transient("connection reset")).code(),
            "TRANSIENT_STORE_ERROR"
        );
    }

    #[test]
    fn test_runner_errors_classify() {
        let exit = RunnerError::NonZeroExit {
            exit_code: 2,
            output: CapturedOutput::default(),
        };
        assert_eq!(
            Outcome::from(&exit),
            Outcome::SandboxFailure {
                reason: "command exited with status 2".to_string(),
                exit_code: Some(2),
            }
        );

        let timeout = RunnerError::Timeout {
            after: Duration::from_secs(5),
            output: CapturedOutput::default(),
        };
        assert_eq!(Outcome::from(&timeout).code(), "TIMEOUT");
        assert_eq!(
            Outcome::from(&RunnerError::Unavailable("down".into())).code(),
            "SERVICE_UNAVAILABLE"
        );
        assert_eq!(
            Outcome::from(&RunnerError::ImageNotFound("nope:1".into())).to_string(),
            "Image not found: nope:1"
        );
    }

    #[test]
    fn test_request_from_config_uses_entrypoint_convention() {
        let request =
            InvocationRequest::from_config("hello.py", &StoreConfig::default(), &SandboxConfig::default());

        assert_eq!(request.namespace, "faas-code");
        assert_eq!(request.image, "python:3.10-slim");
        assert_eq!(request.command, vec!["python", "/app/script.py"]);
        assert_eq!(request.entrypoint, "script.py");
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&InvocationState::CleaningUp).unwrap(),
            "\"cleaning_up\""
        );
        assert!(InvocationState::Failed.is_terminal());
        assert!(!InvocationState::Captured.is_terminal());
    }
}
