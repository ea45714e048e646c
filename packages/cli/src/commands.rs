// ABOUTME: One-shot CLI commands: invoke, upload, list and sweep
// ABOUTME: Each runs against an AppState so the same adapters serve HTTP and terminal use

use anyhow::{anyhow, Context, Result};
use colored::*;
use fnbox_config::GatewayConfig;
use fnbox_invocation::{InvocationReport, WorkspaceManager};
use fnbox_sandbox::DockerRunner;
use fnbox_storage::ArtifactUpload;
use futures::TryStreamExt;
use std::io::Write;
use std::path::Path;

use fnbox_api::AppState;

/// Invoke `key` and print its output
pub async fn invoke(state: &AppState, key: &str) -> Result<InvocationReport> {
    let report = state.pipeline.invoke(state.invocation_request(key)).await;
    print_report(&report)?;
    Ok(report)
}

fn print_report(report: &InvocationReport) -> Result<()> {
    let result = &report.result;

    std::io::stdout().write_all(&result.stdout)?;
    std::io::stderr().write_all(&result.stderr)?;

    if result.outcome.is_success() {
        eprintln!(
            "{} {} ({})",
            "✓".green(),
            result.outcome,
            report.invocation_id.dimmed()
        );
    } else {
        eprintln!(
            "{} {} {} ({})",
            "✗".red(),
            result.outcome.code().red().bold(),
            result.outcome,
            report.invocation_id.dimmed()
        );
    }
    Ok(())
}

/// Upload a local source file; returns the stored key
pub async fn upload(state: &AppState, path: &Path, key: Option<String>) -> Result<String> {
    let store = state
        .store()
        .ok_or_else(|| anyhow!("artifact store is not configured"))?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} is not a file", path.display()))?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let max = state.config.store.max_upload_bytes;
    if bytes.len() > max {
        return Err(anyhow!(
            "{} is {} bytes, above the {} byte upload limit",
            path.display(),
            bytes.len(),
            max
        ));
    }

    let mut upload = ArtifactUpload::from_filename(&filename, bytes)?;
    if let Some(key) = key {
        upload = upload.with_key(key);
    }

    let key = store.put(state.namespace(), upload).await?;
    println!(
        "{} Uploaded {} as {} in {}",
        "✓".green(),
        filename,
        key.bold(),
        state.namespace()
    );
    Ok(key)
}

/// Print every key in the configured namespace
pub async fn list(state: &AppState) -> Result<Vec<String>> {
    let store = state
        .store()
        .ok_or_else(|| anyhow!("artifact store is not configured"))?;

    let keys: Vec<String> = store.list(state.namespace()).try_collect().await?;
    if keys.is_empty() {
        eprintln!("{}", format!("No artifacts in {}", state.namespace()).dimmed());
    }
    for key in &keys {
        println!("{}", key);
    }
    Ok(keys)
}

/// Remove orphaned workspaces, and stopped leftover containers when Docker is reachable
pub async fn sweep(config: &GatewayConfig) -> Result<()> {
    let grace = config.pipeline.orphan_grace;

    let workspaces = WorkspaceManager::new(&config.pipeline.workspace_root);
    let removed = workspaces.sweep_orphans(grace).await?;
    println!(
        "{} Removed {} orphaned workspaces from {}",
        "✓".green(),
        removed.len(),
        config.pipeline.workspace_root.display()
    );

    match DockerRunner::connect(&config.sandbox).await {
        Ok(runner) => {
            let removed = runner.sweep_stale_containers(grace).await?;
            println!("{} Removed {} leftover containers", "✓".green(), removed.len());
        }
        Err(e) => eprintln!("{} Skipping container sweep: {}", "⚠".yellow(), e),
    }
    Ok(())
}
