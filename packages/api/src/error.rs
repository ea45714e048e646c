// ABOUTME: API error type with machine-readable codes and sanitized messages
// ABOUTME: Maps store and request failures to HTTP status codes and a uniform JSON body

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fnbox_storage::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Error type returned by handlers for non-invocation failures
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact store error: {0}")]
    TransientStore(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Structured error response format for API consistency
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    fn to_status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::InvalidArtifact(_) => (StatusCode::BAD_REQUEST, "INVALID_ARTIFACT"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::TransientStore(_) => (StatusCode::BAD_GATEWAY, "TRANSIENT_STORE_ERROR"),
            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
        }
    }

    /// Message safe to return to callers
    fn to_user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Validation failed: {}", msg),
            AppError::InvalidArtifact(msg) => format!("Artifact rejected: {}", msg),
            AppError::NotFound(key) => format!("Artifact '{}' not found", key),
            AppError::TransientStore(_) => {
                "The artifact store is temporarily unreachable".to_string()
            }
            AppError::ServiceUnavailable(msg) => msg.clone(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key, .. } => AppError::NotFound(key),
            StoreError::TransientError(msg) => AppError::TransientStore(msg),
            StoreError::InvalidArtifact(msg) => AppError::InvalidArtifact(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status_code, error_code) = self.to_status_and_code();

        match &self {
            AppError::TransientStore(_) => {
                error!(
                    request_id = %request_id,
                    error = %self,
                    "Request failed"
                );
            }
            _ => {
                info!(
                    request_id = %request_id,
                    error_code = %error_code,
                    error = %self,
                    "API error response"
                );
            }
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message: self.to_user_message(),
            },
            request_id,
        };

        (status_code, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;
