// ABOUTME: Environment variable name constants and built-in defaults
// ABOUTME: Centralized definitions of every knob the gateway reads at startup

// Server
pub const FNBOX_HOST: &str = "FNBOX_HOST";
pub const PORT: &str = "PORT";

// Artifact store
pub const DEFAULT_BUCKET_NAME: &str = "DEFAULT_BUCKET_NAME";
pub const FNBOX_STORE_BACKEND: &str = "FNBOX_STORE_BACKEND";
pub const S3_ACCESS_KEY: &str = "S3_ACCESS_KEY";
pub const S3_SECRET_KEY: &str = "S3_SECRET_KEY";
pub const S3_REGION: &str = "S3_REGION";
pub const S3_ENDPOINT_URL: &str = "S3_ENDPOINT_URL";
pub const FNBOX_MAX_UPLOAD_BYTES: &str = "FNBOX_MAX_UPLOAD_BYTES";

// Sandbox
pub const DEFAULT_DOCKER_IMAGE: &str = "DEFAULT_DOCKER_IMAGE";
pub const DEFAULT_CONTAINER_COMMAND: &str = "DEFAULT_CONTAINER_COMMAND";
pub const FNBOX_RUN_TIMEOUT_SECS: &str = "FNBOX_RUN_TIMEOUT_SECS";
pub const FNBOX_PULL_MISSING_IMAGES: &str = "FNBOX_PULL_MISSING_IMAGES";

// Invocation pipeline
pub const FNBOX_WORKSPACE_ROOT: &str = "FNBOX_WORKSPACE_ROOT";
pub const FNBOX_MAX_CONCURRENT_INVOCATIONS: &str = "FNBOX_MAX_CONCURRENT_INVOCATIONS";
pub const FNBOX_ORPHAN_GRACE_SECS: &str = "FNBOX_ORPHAN_GRACE_SECS";
pub const FNBOX_SWEEP_INTERVAL_SECS: &str = "FNBOX_SWEEP_INTERVAL_SECS";

// Defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_NAMESPACE: &str = "faas-code";
pub const DEFAULT_IMAGE: &str = "python:3.10-slim";
pub const DEFAULT_COMMAND: &str = "python /app/script.py";
pub const DEFAULT_S3_REGION: &str = "eu-north-1";
pub const DEFAULT_ORPHAN_GRACE_SECS: u64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// Directory name created under the system temp dir when no workspace root is configured
pub const DEFAULT_WORKSPACE_DIR_NAME: &str = "fnbox";

/// In-sandbox mount point of the invocation workspace. The command runs here.
pub const SANDBOX_MOUNT_PATH: &str = "/app";

/// File name every fetched artifact is staged under. The default command
/// executes exactly this file, so no path is ever taken from the request.
pub const ENTRYPOINT_FILE_NAME: &str = "script.py";
