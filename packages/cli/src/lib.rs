// ABOUTME: fnbox binary support: tracing setup, server startup and one-shot commands
// ABOUTME: Wires configuration into adapters, the pipeline and the HTTP router

use anyhow::Context;
use colored::*;
use fnbox_api::{create_router, AppState};
use fnbox_config::GatewayConfig;
use fnbox_invocation::start_sweep_task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod commands;

/// Install the global tracing subscriber (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Serve the gateway until Ctrl-C
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let sweep = config
        .pipeline
        .sweep_interval
        .map(|interval| (interval, config.pipeline.orphan_grace));

    let state = AppState::from_config(config).await;

    if let Some((interval, grace)) = sweep {
        start_sweep_task(state.pipeline.workspaces().clone(), interval, grace);
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Server listening on {}", addr);
    println!("{} Server listening on {}", "✅".green(), addr.bold());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
