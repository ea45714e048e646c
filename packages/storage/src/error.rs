// ABOUTME: Error types for artifact store operations
// ABOUTME: Separates missing artifacts from transient store failures and rejected uploads

use thiserror::Error;

/// Artifact store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist in the namespace
    #[error("Artifact not found: {namespace}/{key}")]
    NotFound { namespace: String, key: String },

    /// Connectivity, auth or server-side failure; the caller may retry
    #[error("Transient store error: {0}")]
    TransientError(String),

    /// Upload rejected by the content policy or key rules
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),
}

impl StoreError {
    pub fn not_found(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientError(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArtifact(msg.into())
    }

    /// Whether a caller-level retry could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransientError(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
