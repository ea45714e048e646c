// ABOUTME: HTTP API layer for fnbox providing the invocation, upload and listing routes
// ABOUTME: Integration layer over the invocation pipeline and the artifact store

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiResult, AppError};
pub use state::{build_runner, build_store, AppState};

/// Creates the gateway router
pub fn create_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.store.max_upload_bytes;

    Router::new()
        .route("/run", get(handlers::run_artifact))
        .route("/api/invocations", post(handlers::create_invocation))
        .route("/upload", post(handlers::upload_artifact))
        .route("/list", get(handlers::list_artifacts))
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
