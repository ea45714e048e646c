// ABOUTME: Shared application state and adapter construction from configuration
// ABOUTME: Missing credentials or an unreachable engine leave the adapter unset instead of failing

use fnbox_config::{GatewayConfig, SandboxConfig, StoreBackend, StoreConfig};
use fnbox_invocation::{InvocationPipeline, InvocationRequest};
use fnbox_sandbox::{DockerRunner, SandboxRunner};
use fnbox_storage::{ArtifactStore, MemoryArtifactStore, S3ArtifactStore};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub pipeline: Arc<InvocationPipeline>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        store: Option<Arc<dyn ArtifactStore>>,
        runner: Option<Arc<dyn SandboxRunner>>,
    ) -> Self {
        let pipeline =
            InvocationPipeline::from_config(store, runner, &config.pipeline, &config.sandbox);
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Build every adapter the configuration allows
    pub async fn from_config(config: GatewayConfig) -> Self {
        let store = build_store(&config.store).await;
        let runner = build_runner(&config.sandbox).await;
        Self::new(config, store, runner)
    }

    pub fn store(&self) -> Option<&Arc<dyn ArtifactStore>> {
        self.pipeline.store()
    }

    pub fn namespace(&self) -> &str {
        &self.config.store.namespace
    }

    /// Request for `key` with the configured namespace, image and command
    pub fn invocation_request(&self, key: &str) -> InvocationRequest {
        InvocationRequest::from_config(key, &self.config.store, &self.config.sandbox)
    }
}

pub async fn build_store(config: &StoreConfig) -> Option<Arc<dyn ArtifactStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory artifact store");
            Some(Arc::new(MemoryArtifactStore::new()))
        }
        StoreBackend::S3 => match S3ArtifactStore::from_config(config).await {
            Some(store) => Some(Arc::new(store)),
            None => {
                warn!("S3 credentials not configured; artifact store disabled");
                None
            }
        },
    }
}

pub async fn build_runner(config: &SandboxConfig) -> Option<Arc<dyn SandboxRunner>> {
    match DockerRunner::connect(config).await {
        Ok(runner) => Some(Arc::new(runner)),
        Err(e) => {
            warn!("Docker unavailable; sandbox runner disabled: {}", e);
            None
        }
    }
}
