// ABOUTME: ArtifactStore trait and upload policy shared by every backend
// ABOUTME: Source-code allowlist, collision-resistant key generation and key validation

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Maximum key length accepted by S3-compatible stores
const MAX_KEY_LEN: usize = 1024;

/// File extensions accepted for upload and the content type stored with each
pub const SOURCE_CONTENT_TYPES: &[(&str, &str)] = &[
    ("py", "text/x-python"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("ts", "application/typescript"),
    ("rb", "text/x-ruby"),
    ("sh", "application/x-sh"),
    ("lua", "text/x-lua"),
    ("pl", "text/x-perl"),
    ("php", "application/x-httpd-php"),
];

/// Lazy, finite, single-pass enumeration of object keys
pub type KeyStream = BoxStream<'static, Result<String>>;

/// Capability to read and write code artifacts by namespace-scoped key.
///
/// Implementations hold no per-call state and are shared across concurrent
/// invocations behind an `Arc`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Short backend identifier used in logs and health output
    fn backend_name(&self) -> &'static str;

    /// Fetch the artifact bytes. Fails with `NotFound` when the key is absent.
    async fn fetch(&self, namespace: &str, key: &str) -> Result<Bytes>;

    /// Store an artifact and return its key
    async fn put(&self, namespace: &str, upload: ArtifactUpload) -> Result<String>;

    /// Enumerate current keys. Ordering is backend-defined.
    fn list(&self, namespace: &str) -> KeyStream;
}

/// An artifact submitted for upload
#[derive(Debug, Clone)]
pub struct ArtifactUpload {
    /// Caller-chosen key; generated when absent
    pub key: Option<String>,
    /// Declared file name, used for generated keys
    pub filename: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ArtifactUpload {
    /// Build an upload from a declared file name, rejecting non-source files
    pub fn from_filename(filename: &str, bytes: impl Into<Bytes>) -> Result<Self> {
        let content_type = content_type_for_filename(filename)?;
        Ok(Self {
            key: None,
            filename: Some(filename.to_string()),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        })
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Apply the content policy and return the key this upload is stored under
    pub fn resolve_key(&self) -> Result<String> {
        if !SOURCE_CONTENT_TYPES
            .iter()
            .any(|(_, ct)| *ct == self.content_type)
        {
            return Err(StoreError::invalid(format!(
                "content type '{}' is not an accepted source type",
                self.content_type
            )));
        }

        if self.bytes.is_empty() {
            return Err(StoreError::invalid("artifact is empty"));
        }

        match &self.key {
            Some(key) => {
                validate_key(key)?;
                Ok(key.clone())
            }
            None => Ok(generate_key(self.filename.as_deref(), &self.content_type)),
        }
    }
}

/// Map a file name to its source content type by extension
pub fn content_type_for_filename(filename: &str) -> Result<&'static str> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| {
            StoreError::invalid(format!("'{}' has no file extension", filename))
        })?;

    SOURCE_CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, ct)| *ct)
        .ok_or_else(|| {
            StoreError::invalid(format!(
                "'{}' is not a source code file (allowed: {})",
                filename,
                SOURCE_CONTENT_TYPES
                    .iter()
                    .map(|(ext, _)| *ext)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

/// Generate a collision-resistant key, keeping the file name readable
pub fn generate_key(filename: Option<&str>, content_type: &str) -> String {
    let id = Uuid::new_v4();
    match filename.map(sanitize_filename).filter(|s| !s.is_empty()) {
        Some(name) => format!("{}-{}", id, name),
        None => {
            let ext = SOURCE_CONTENT_TYPES
                .iter()
                .find(|(_, ct)| *ct == content_type)
                .map(|(ext, _)| *ext)
                .unwrap_or("txt");
            format!("{}.{}", id, ext)
        }
    }
}

/// Reject keys that are empty, oversized, absolute or traverse upward
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::invalid("key must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::invalid(format!(
            "key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }
    if key.starts_with('/') {
        return Err(StoreError::invalid("key must not start with '/'"));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(StoreError::invalid("key must not contain '..' segments"));
    }
    if key.chars().any(char::is_control) {
        return Err(StoreError::invalid("key must not contain control characters"));
    }
    Ok(())
}

fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
