// ABOUTME: Process-local artifact store backed by a map
// ABOUTME: Used for credential-free development and as the store in tests

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::{ArtifactStore, ArtifactUpload, KeyStream};

type Namespaces = HashMap<String, BTreeMap<String, Bytes>>;

/// In-memory artifact store
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    objects: Arc<RwLock<Namespaces>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert raw bytes under a key, bypassing the upload policy
    pub async fn insert(&self, namespace: &str, key: &str, bytes: impl Into<Bytes>) {
        let mut objects = self.objects.write().await;
        objects
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), bytes.into());
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, namespace: &str, key: &str) -> Result<Bytes> {
        let objects = self.objects.read().await;
        objects
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(namespace, key))
    }

    async fn put(&self, namespace: &str, upload: ArtifactUpload) -> Result<String> {
        let key = upload.resolve_key()?;
        debug!(
            "Storing artifact {}/{} ({} bytes, {})",
            namespace,
            key,
            upload.bytes.len(),
            upload.content_type
        );

        let mut objects = self.objects.write().await;
        objects
            .entry(namespace.to_string())
            .or_default()
            .insert(key.clone(), upload.bytes);
        Ok(key)
    }

    fn list(&self, namespace: &str) -> KeyStream {
        let objects = self.objects.clone();
        let namespace = namespace.to_string();

        Box::pin(stream! {
            let keys: Vec<String> = {
                let objects = objects.read().await;
                objects
                    .get(&namespace)
                    .map(|ns| ns.keys().cloned().collect())
                    .unwrap_or_default()
            };
            for key in keys {
                yield Ok::<_, StoreError>(key);
            }
        })
    }
}
