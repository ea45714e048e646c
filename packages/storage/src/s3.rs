// ABOUTME: S3-compatible artifact store using the AWS SDK
// ABOUTME: Namespaces map to buckets; missing keys and transport failures are classified apart

use async_stream::stream;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use fnbox_config::{S3Credentials, StoreConfig};
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::store::{ArtifactStore, ArtifactUpload, KeyStream};

/// Error codes that mean the key itself is absent
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NotFound"];

/// AWS S3 (or S3-compatible) artifact store
#[derive(Debug, Clone)]
pub struct S3ArtifactStore {
    client: Client,
}

impl S3ArtifactStore {
    /// Wrap an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from static credentials.
    ///
    /// SDK-level retries are disabled: the gateway surfaces transient errors
    /// to its caller instead of retrying on its own.
    pub async fn from_credentials(
        credentials: &S3Credentials,
        region: &str,
        endpoint: Option<&str>,
    ) -> Self {
        let aws_creds = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None,
            None,
            "fnbox-artifact-store",
        );

        let mut config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(aws_creds)
            .retry_config(RetryConfig::disabled());

        if let Some(endpoint) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint);
        }

        let sdk_config = config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(endpoint.is_some())
            .build();

        info!(
            "S3 artifact store initialized (region: {}, endpoint: {})",
            region,
            endpoint.unwrap_or("aws")
        );

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// Build the store from configuration; `None` when credentials are absent
    pub async fn from_config(config: &StoreConfig) -> Option<Self> {
        match &config.credentials {
            Some(credentials) => Some(
                Self::from_credentials(credentials, &config.region, config.endpoint.as_deref())
                    .await,
            ),
            None => None,
        }
    }
}

/// Classify a GetObject failure into NotFound vs TransientError
fn classify_get_error(
    err: SdkError<GetObjectError>,
    namespace: &str,
    key: &str,
) -> StoreError {
    let code_is_not_found = err
        .as_service_error()
        .map(|e| e.is_no_such_key() || e.code().is_some_and(|c| NOT_FOUND_CODES.contains(&c)))
        .unwrap_or(false);

    // A missing bucket also answers 404; that is a configuration problem,
    // not a missing artifact.
    let missing_bucket = err
        .as_service_error()
        .and_then(|e| e.code())
        .is_some_and(|c| c == "NoSuchBucket");

    let status_is_404 = err
        .raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false);

    if code_is_not_found || (status_is_404 && !missing_bucket) {
        debug!("S3 object not found: s3://{}/{}", namespace, key);
        StoreError::not_found(namespace, key)
    } else {
        error!("Error downloading s3://{}/{}: {}", namespace, key, err);
        StoreError::transient(format!("failed to download {}: {}", key, describe(&err)))
    }
}

fn describe<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata,
{
    match err.as_service_error() {
        Some(service_err) => format!(
            "{} ({})",
            service_err.message().unwrap_or("service error"),
            service_err.code().unwrap_or("unknown")
        ),
        None => err.to_string(),
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn fetch(&self, namespace: &str, key: &str) -> Result<Bytes> {
        debug!("Attempting to download s3://{}/{}", namespace, key);

        let output = self
            .client
            .get_object()
            .bucket(namespace)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(e, namespace, key))?;

        let body = output.body.collect().await.map_err(|e| {
            StoreError::transient(format!("failed to read body of {}: {}", key, e))
        })?;

        let bytes = body.into_bytes();
        debug!(
            "Downloaded s3://{}/{} ({} bytes)",
            namespace,
            key,
            bytes.len()
        );
        Ok(bytes)
    }

    async fn put(&self, namespace: &str, upload: ArtifactUpload) -> Result<String> {
        let key = upload.resolve_key()?;

        self.client
            .put_object()
            .bucket(namespace)
            .key(&key)
            .content_type(&upload.content_type)
            .body(ByteStream::from(upload.bytes))
            .send()
            .await
            .map_err(|e| {
                error!("Error uploading s3://{}/{}: {}", namespace, key, e);
                StoreError::transient(format!("failed to upload {}: {}", key, describe(&e)))
            })?;

        info!("Uploaded artifact s3://{}/{}", namespace, key);
        Ok(key)
    }

    fn list(&self, namespace: &str) -> KeyStream {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(namespace)
            .into_paginator()
            .send();
        let namespace = namespace.to_string();

        Box::pin(stream! {
            while let Some(page) = pages.next().await {
                match page {
                    Ok(page) => {
                        for object in page.contents() {
                            if let Some(key) = object.key() {
                                yield Ok(key.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error listing s3://{}: {}", namespace, e);
                        yield Err(StoreError::transient(format!(
                            "failed to list {}: {}",
                            namespace,
                            describe(&e)
                        )));
                        break;
                    }
                }
            }
        })
    }
}
