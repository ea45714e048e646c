// ABOUTME: Gateway configuration loaded from environment variables
// ABOUTME: Parses and validates server, store, sandbox and pipeline settings

pub mod constants;

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Invalid store backend: {0}")]
    InvalidStoreBackend(String),
    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    S3,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StoreBackend::S3),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::InvalidStoreBackend(s.to_string())),
        }
    }
}

/// Credentials for the S3-compatible artifact store
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub namespace: String,
    /// `None` leaves the S3 adapter uninitialized
    pub credentials: Option<S3Credentials>,
    pub region: String,
    pub endpoint: Option<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub command: Vec<String>,
    pub run_timeout: Option<Duration>,
    pub pull_missing_images: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub max_concurrent_invocations: Option<usize>,
    pub orphan_grace: Duration,
    /// `None` disables the periodic orphan sweep
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub sandbox: SandboxConfig,
    pub pipeline: PipelineConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            namespace: DEFAULT_NAMESPACE.to_string(),
            credentials: None,
            region: DEFAULT_S3_REGION.to_string(),
            endpoint: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            command: DEFAULT_COMMAND.split_whitespace().map(str::to_string).collect(),
            run_timeout: None,
            pull_missing_images: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: env::temp_dir().join(DEFAULT_WORKSPACE_DIR_NAME),
            max_concurrent_invocations: None,
            orphan_grace: Duration::from_secs(DEFAULT_ORPHAN_GRACE_SECS),
            sweep_interval: Some(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = get(FNBOX_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_number::<u16>(&get, PORT)?.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let backend = get(FNBOX_STORE_BACKEND)
            .map(|v| v.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or(StoreBackend::S3);

        let credentials = match (get(S3_ACCESS_KEY), get(S3_SECRET_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(S3Credentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                warn!("Only one of S3_ACCESS_KEY / S3_SECRET_KEY is set; store disabled");
                None
            }
        };

        let max_upload_bytes =
            parse_number::<usize>(&get, FNBOX_MAX_UPLOAD_BYTES)?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(ConfigError::Zero(FNBOX_MAX_UPLOAD_BYTES));
        }

        let store = StoreConfig {
            backend,
            namespace: get(DEFAULT_BUCKET_NAME).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            credentials,
            region: get(S3_REGION).unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            endpoint: get(S3_ENDPOINT_URL),
            max_upload_bytes,
        };

        let command = parse_command(&get(DEFAULT_CONTAINER_COMMAND).unwrap_or_else(|| DEFAULT_COMMAND.to_string()))?;

        let run_timeout = match parse_number::<u64>(&get, FNBOX_RUN_TIMEOUT_SECS)? {
            Some(0) => return Err(ConfigError::Zero(FNBOX_RUN_TIMEOUT_SECS)),
            other => other.map(Duration::from_secs),
        };

        let pull_missing_images = match get(FNBOX_PULL_MISSING_IMAGES) {
            Some(value) => parse_bool(FNBOX_PULL_MISSING_IMAGES, &value)?,
            None => true,
        };

        let sandbox = SandboxConfig {
            image: get(DEFAULT_DOCKER_IMAGE).unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            command,
            run_timeout,
            pull_missing_images,
        };

        let max_concurrent_invocations =
            match parse_number::<usize>(&get, FNBOX_MAX_CONCURRENT_INVOCATIONS)? {
                Some(0) => return Err(ConfigError::Zero(FNBOX_MAX_CONCURRENT_INVOCATIONS)),
                other => other,
            };

        let orphan_grace = match parse_number::<u64>(&get, FNBOX_ORPHAN_GRACE_SECS)?
            .unwrap_or(DEFAULT_ORPHAN_GRACE_SECS)
        {
            0 => return Err(ConfigError::Zero(FNBOX_ORPHAN_GRACE_SECS)),
            secs => Duration::from_secs(secs),
        };

        let sweep_interval = match parse_number::<u64>(&get, FNBOX_SWEEP_INTERVAL_SECS)?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let pipeline = PipelineConfig {
            workspace_root: get(FNBOX_WORKSPACE_ROOT)
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join(DEFAULT_WORKSPACE_DIR_NAME)),
            max_concurrent_invocations,
            orphan_grace,
            sweep_interval,
        };

        Ok(GatewayConfig {
            host,
            port,
            store,
            sandbox,
            pipeline,
        })
    }
}

fn parse_number<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>>
where
    T: FromStr<Err = ParseIntError>,
{
    get(name)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|source| ConfigError::InvalidNumber { name, source })
        })
        .transpose()
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_command(raw: &str) -> Result<Vec<String>> {
    let command: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if command.is_empty() {
        return Err(ConfigError::Empty(DEFAULT_CONTAINER_COMMAND));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.store.backend, StoreBackend::S3);
        assert_eq!(config.store.namespace, "faas-code");
        assert_eq!(config.store.region, "eu-north-1");
        assert!(config.store.credentials.is_none());
        assert_eq!(config.sandbox.image, "python:3.10-slim");
        assert_eq!(config.sandbox.command, vec!["python", "/app/script.py"]);
        assert!(config.sandbox.run_timeout.is_none());
        assert!(config.sandbox.pull_missing_images);
        assert!(config.pipeline.max_concurrent_invocations.is_none());
        assert_eq!(config.pipeline.sweep_interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_struct_defaults_match_empty_environment() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.sandbox.command, SandboxConfig::default().command);
        assert_eq!(config.store.namespace, StoreConfig::default().namespace);
        assert_eq!(
            config.pipeline.workspace_root,
            PipelineConfig::default().workspace_root
        );
    }

    #[test]
    fn test_credentials_require_both_keys() {
        let config = config_from(&[(S3_ACCESS_KEY, "AKIA")]).unwrap();
        assert!(config.store.credentials.is_none());

        let config = config_from(&[(S3_ACCESS_KEY, "AKIA"), (S3_SECRET_KEY, "secret")]).unwrap();
        let creds = config.store.credentials.unwrap();
        assert_eq!(creds.access_key_id, "AKIA");
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(
            config_from(&[(PORT, "0")]),
            Err(ConfigError::PortOutOfRange(0))
        ));
        assert!(matches!(
            config_from(&[(PORT, "http")]),
            Err(ConfigError::InvalidNumber { name: PORT, .. })
        ));
    }

    #[test]
    fn test_pipeline_limits() {
        let config = config_from(&[
            (FNBOX_RUN_TIMEOUT_SECS, "30"),
            (FNBOX_MAX_CONCURRENT_INVOCATIONS, "8"),
            (FNBOX_SWEEP_INTERVAL_SECS, "0"),
            (FNBOX_WORKSPACE_ROOT, "/var/lib/fnbox"),
        ])
        .unwrap();

        assert_eq!(config.sandbox.run_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.pipeline.max_concurrent_invocations, Some(8));
        assert_eq!(config.pipeline.sweep_interval, None);
        assert_eq!(config.pipeline.workspace_root, PathBuf::from("/var/lib/fnbox"));

        assert!(matches!(
            config_from(&[(FNBOX_MAX_CONCURRENT_INVOCATIONS, "0")]),
            Err(ConfigError::Zero(_))
        ));
    }

    #[test]
    fn test_zero_orphan_grace_is_rejected() {
        assert!(matches!(
            config_from(&[(FNBOX_ORPHAN_GRACE_SECS, "0")]),
            Err(ConfigError::Zero(FNBOX_ORPHAN_GRACE_SECS))
        ));

        let config = config_from(&[(FNBOX_ORPHAN_GRACE_SECS, "60")]).unwrap();
        assert_eq!(config.pipeline.orphan_grace, Duration::from_secs(60));
    }

    #[test]
    fn test_command_and_backend_parsing() {
        let config = config_from(&[
            (DEFAULT_CONTAINER_COMMAND, "  node   /app/script.py "),
            (FNBOX_STORE_BACKEND, "Memory"),
            (FNBOX_PULL_MISSING_IMAGES, "off"),
        ])
        .unwrap();

        assert_eq!(config.sandbox.command, vec!["node", "/app/script.py"]);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.sandbox.pull_missing_images);

        assert!(matches!(
            config_from(&[(FNBOX_STORE_BACKEND, "gcs")]),
            Err(ConfigError::InvalidStoreBackend(_))
        ));
        assert!(matches!(
            config_from(&[(FNBOX_PULL_MISSING_IMAGES, "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
    }
}
