// ABOUTME: Tests for the one-shot CLI commands against an in-memory store
// ABOUTME: Upload, list and invoke share one AppState like a running gateway would

use async_trait::async_trait;
use fnbox_api::AppState;
use fnbox_cli::commands;
use fnbox_config::constants::FNBOX_WORKSPACE_ROOT;
use fnbox_config::GatewayConfig;
use fnbox_invocation::Outcome;
use fnbox_sandbox::{CapturedOutput, RunSpec, SandboxRunner};
use fnbox_storage::{ArtifactStore, MemoryArtifactStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

struct CatRunner;

#[async_trait]
impl SandboxRunner for CatRunner {
    fn engine_name(&self) -> &'static str {
        "cat"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn run(&self, spec: &RunSpec) -> fnbox_sandbox::Result<CapturedOutput> {
        let script = std::fs::read(spec.mount_source.join("script.py")).unwrap_or_default();
        Ok(CapturedOutput::new(script, ""))
    }
}

fn state(workspaces: &TempDir) -> AppState {
    let root = workspaces.path().to_string_lossy().into_owned();
    let config = GatewayConfig::from_lookup(|name| {
        (name == FNBOX_WORKSPACE_ROOT).then(|| root.clone())
    })
    .unwrap();

    AppState::new(
        config,
        Some(Arc::new(MemoryArtifactStore::new()) as Arc<dyn ArtifactStore>),
        Some(Arc::new(CatRunner) as Arc<dyn SandboxRunner>),
    )
}

#[tokio::test]
async fn test_upload_list_invoke() {
    let workspaces = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let state = state(&workspaces);

    let path = files.path().join("hello.py");
    std::fs::write(&path, "print(\"hi\")\n").unwrap();

    let key = commands::upload(&state, &path, None).await.unwrap();
    assert!(key.ends_with("-hello.py"));

    let keys = commands::list(&state).await.unwrap();
    assert_eq!(keys, vec![key.clone()]);

    let report = commands::invoke(&state, &key).await.unwrap();
    assert_eq!(report.result.outcome, Outcome::Success);
    assert_eq!(report.result.stdout_lossy(), "print(\"hi\")\n");
}

#[tokio::test]
async fn test_upload_rejects_non_source_and_missing_files() {
    let workspaces = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let state = state(&workspaces);

    let binary = files.path().join("tool.exe");
    std::fs::write(&binary, b"MZ").unwrap();
    assert!(commands::upload(&state, &binary, None).await.is_err());

    let missing = files.path().join("missing.py");
    assert!(commands::upload(&state, &missing, None).await.is_err());

    assert!(commands::list(&state).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commands_without_store_fail() {
    let workspaces = TempDir::new().unwrap();
    let config = state(&workspaces).config.as_ref().clone();
    let state = AppState::new(config, None, None);

    assert!(commands::list(&state).await.is_err());

    let report = commands::invoke(&state, "hello.py").await.unwrap();
    assert!(matches!(report.result.outcome, Outcome::ServiceUnavailable(_)));
}
