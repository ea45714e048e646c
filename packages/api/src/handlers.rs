// ABOUTME: HTTP handlers for the invocation, upload, listing and health triggers
// ABOUTME: Thin adapters between axum extractors and the pipeline or artifact store

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use fnbox_invocation::{InvocationReport, Outcome};
use fnbox_storage::ArtifactUpload;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{ApiResult, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    #[serde(alias = "KEY")]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct OutcomeBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct InvocationResponse {
    pub success: bool,
    pub invocation_id: String,
    pub outcome: OutcomeBody,
    pub stdout: String,
    pub stderr: String,
}

impl From<InvocationReport> for InvocationResponse {
    fn from(report: InvocationReport) -> Self {
        let result = report.result;
        Self {
            success: result.outcome.is_success(),
            invocation_id: report.invocation_id,
            outcome: OutcomeBody {
                code: result.outcome.code(),
                message: result.outcome.to_string(),
            },
            stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        }
    }
}

/// HTTP status for a finished invocation
pub fn outcome_status(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Success => StatusCode::OK,
        Outcome::NotFound { .. } => StatusCode::NOT_FOUND,
        Outcome::TransientStoreError(_) => StatusCode::BAD_GATEWAY,
        Outcome::ImageNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Outcome::SandboxFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        Outcome::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Outcome::ResourceExhausted(_) => StatusCode::INSUFFICIENT_STORAGE,
        Outcome::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Outcome::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn invoke_key(state: &AppState, key: &str) -> ApiResult<impl IntoResponse> {
    if key.trim().is_empty() {
        return Err(AppError::validation("missing artifact key"));
    }

    info!("Invoking artifact: {}", key);
    let report = state.pipeline.invoke(state.invocation_request(key)).await;
    let status = outcome_status(&report.result.outcome);

    Ok((status, Json(InvocationResponse::from(report))))
}

/// Run an artifact by key
///
/// GET /run?key=<key>
pub async fn run_artifact(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> ApiResult<impl IntoResponse> {
    let key = query
        .key
        .ok_or_else(|| AppError::validation("missing 'key' query parameter"))?;
    invoke_key(&state, &key).await
}

/// Run an artifact by key
///
/// POST /api/invocations
pub async fn create_invocation(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> ApiResult<impl IntoResponse> {
    invoke_key(&state, &request.key).await
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
    pub namespace: String,
}

/// Store raw source bytes as a new artifact
///
/// POST /upload?filename=<name>[&key=<key>]
pub async fn upload_artifact(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<Json<UploadResponse>> {
    let store = state
        .store()
        .ok_or_else(|| AppError::unavailable("artifact store is not configured"))?;

    let filename = query
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::validation("missing 'filename' query parameter"))?;

    let mut upload = ArtifactUpload::from_filename(&filename, body)?;
    if let Some(key) = query.key {
        upload = upload.with_key(key);
    }

    let namespace = state.namespace().to_string();
    let key = store.put(&namespace, upload).await?;
    info!("Uploaded artifact {} to {}", key, namespace);

    Ok(Json(UploadResponse { key, namespace }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub namespace: String,
    pub keys: Vec<String>,
}

/// List artifact keys in the configured namespace
///
/// GET /list
pub async fn list_artifacts(State(state): State<AppState>) -> ApiResult<Json<ListResponse>> {
    let store = state
        .store()
        .ok_or_else(|| AppError::unavailable("artifact store is not configured"))?;

    let namespace = state.namespace().to_string();
    let keys: Vec<String> = store.list(&namespace).try_collect().await?;

    Ok(Json(ListResponse { namespace, keys }))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store().map(|s| s.backend_name());
    let runner = state.pipeline.runner();
    let sandbox_available = match runner {
        Some(runner) => runner.is_available().await,
        None => false,
    };

    let healthy = store.is_some() && sandbox_available;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "service": "fnbox",
            "store": {
                "configured": store.is_some(),
                "backend": store,
            },
            "sandbox": {
                "configured": runner.is_some(),
                "engine": runner.map(|r| r.engine_name()),
                "available": sandbox_available,
            },
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnbox_invocation::{ExecutionResult, InvocationState};
    use fnbox_sandbox::CapturedOutput;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_outcome_status_mapping() {
        let cases = [
            (Outcome::Success, 200),
            (Outcome::NotFound { key: "a".into() }, 404),
            (Outcome::TransientStoreError("x".into()), 502),
            (Outcome::ImageNotFound("x".into()), 500),
            (
                Outcome::SandboxFailure {
                    reason: "x".into(),
                    exit_code: Some(1),
                },
                500,
            ),
            (
                Outcome::Timeout {
                    after: Duration::from_secs(1),
                },
                504,
            ),
            (Outcome::ResourceExhausted("x".into()), 507),
            (Outcome::ServiceUnavailable("x".into()), 503),
            (Outcome::UnexpectedError("x".into()), 500),
        ];

        for (outcome, status) in cases {
            assert_eq!(outcome_status(&outcome).as_u16(), status, "{:?}", outcome);
        }
    }

    #[test]
    fn test_full_workspace_disk_is_insufficient_storage() {
        let err = fnbox_invocation::WorkspaceError::from_io(
            "/tmp/fnbox",
            std::io::Error::from_raw_os_error(28),
        );
        let outcome = Outcome::from(&err);

        assert_eq!(outcome_status(&outcome), StatusCode::INSUFFICIENT_STORAGE);
    }

    #[test]
    fn test_response_carries_partial_output() {
        let report = InvocationReport {
            invocation_id: "inv-1".to_string(),
            result: ExecutionResult::new(
                Outcome::SandboxFailure {
                    reason: "command exited with status 1".into(),
                    exit_code: Some(1),
                },
                CapturedOutput::new("partial\n", "Traceback\n"),
            ),
            states: vec![InvocationState::Received, InvocationState::Failed],
            workspace_root: None,
        };

        let response = InvocationResponse::from(report);
        assert!(!response.success);
        assert_eq!(response.outcome.code, "SANDBOX_FAILURE");
        assert_eq!(response.stdout, "partial\n");
        assert_eq!(response.stderr, "Traceback\n");
    }
}
