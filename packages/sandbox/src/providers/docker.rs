// ABOUTME: Docker sandbox runner for ephemeral, read-only, network-less containers
// ABOUTME: Uses bollard to resolve images, run one command, capture output and always remove the container

use super::{CapturedOutput, Result, RunSpec, RunnerError, SandboxRunner};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
        RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
    },
    errors::Error as BollardError,
    image::CreateImageOptions,
    models::{HostConfig, Mount, MountTypeEnum, RestartPolicy, RestartPolicyNameEnum},
    Docker,
};
use fnbox_config::constants::SANDBOX_MOUNT_PATH;
use fnbox_config::SandboxConfig;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Labels applied to every fnbox container for tracking and sweeping
const MANAGED_LABEL: &str = "fnbox.managed";
const RUN_ID_LABEL: &str = "fnbox.invocation_id";

/// Default timeout for image pulls (10 minutes)
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// A container carrying the fnbox management label
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub id: String,
    pub run_id: String,
    /// Creation time, seconds since the Unix epoch
    pub created: i64,
    /// Engine state such as `running` or `exited`
    pub state: String,
}

impl ManagedContainer {
    /// True once the container can no longer be serving a live run
    pub fn is_stopped(&self) -> bool {
        matches!(self.state.as_str(), "exited" | "dead")
    }
}

pub struct DockerRunner {
    client: Docker,
    pull_missing_images: bool,
    pull_timeout: Duration,
}

impl DockerRunner {
    /// Connect to the Docker daemon named by `DOCKER_HOST` (or the platform
    /// default socket) and verify it answers.
    pub async fn connect(config: &SandboxConfig) -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| RunnerError::Unavailable(e.to_string()))?;

        client.ping().await.map_err(|e| {
            error!("Failed to connect to Docker daemon: {}", e);
            RunnerError::Unavailable(format!("Docker daemon not reachable: {}", e))
        })?;

        info!("Docker client initialized successfully");
        Ok(Self::with_client(client).with_pull_missing_images(config.pull_missing_images))
    }

    /// Wrap an existing Docker connection
    pub fn with_client(client: Docker) -> Self {
        Self {
            client,
            pull_missing_images: true,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    pub fn with_pull_missing_images(mut self, enabled: bool) -> Self {
        self.pull_missing_images = enabled;
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Container configuration for one run: workspace mounted read-only at
    /// the sandbox mount path, no network, no capabilities.
    pub fn container_config(spec: &RunSpec) -> Config<String> {
        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (RUN_ID_LABEL.to_string(), spec.run_id.clone()),
        ]);

        let host_config = HostConfig {
            mounts: Some(vec![Mount {
                target: Some(SANDBOX_MOUNT_PATH.to_string()),
                source: Some(spec.mount_source.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(true),
                ..Default::default()
            }]),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            privileged: Some(false),
            // Removal is explicit so logs can be read after exit
            auto_remove: Some(false),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: Some(0),
            }),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(SANDBOX_MOUNT_PATH.to_string()),
            labels: Some(labels),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            network_disabled: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// All fnbox-managed containers, running or not
    pub async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{}=true", MANAGED_LABEL)],
        )]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| RunnerError::engine(format!("failed to list containers: {}", e)))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let run_id = c
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(RUN_ID_LABEL).cloned())
                    .unwrap_or_default();
                c.id.map(|id| ManagedContainer {
                    id,
                    run_id,
                    created: c.created.unwrap_or(0),
                    state: c.state.unwrap_or_default(),
                })
            })
            .collect())
    }

    /// Remove stopped managed containers older than `max_age`, left behind
    /// by a process that died before teardown. Running containers may belong
    /// to a live gateway and are never touched.
    pub async fn sweep_stale_containers(&self, max_age: Duration) -> Result<Vec<String>> {
        let cutoff = chrono::Utc::now().timestamp() - max_age.as_secs() as i64;
        let mut removed = Vec::new();

        for container in self.list_managed_containers().await? {
            if !container.is_stopped() || container.created >= cutoff {
                continue;
            }
            match self.remove_container(&container.id).await {
                Ok(()) => {
                    debug!(
                        "Removed stale container {} (run {})",
                        container.id, container.run_id
                    );
                    removed.push(container.id)
                }
                Err(e) => warn!("Failed to remove stale container {}: {}", container.id, e),
            }
        }

        if !removed.is_empty() {
            info!("Removed {} stale containers", removed.len());
        }
        Ok(removed)
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.client.inspect_image(image).await {
            Ok(_) => {
                debug!("Image {} already exists locally", image);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                if !self.pull_missing_images {
                    error!("Docker image not found: {}", image);
                    return Err(RunnerError::ImageNotFound(image.to_string()));
                }
                self.pull_image(image).await
            }
            Err(e) => Err(RunnerError::engine(format!(
                "failed to inspect image {}: {}",
                image, e
            ))),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image: {} (timeout: {:?})", image, self.pull_timeout);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);

        let pulled = tokio::time::timeout(self.pull_timeout, async {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(info) => {
                        if let Some(error) = info.error {
                            return Err(pull_error(image, &error, is_missing_image(&error)));
                        }
                        if let Some(status) = info.status {
                            debug!("Pull status: {}", status);
                        }
                    }
                    Err(BollardError::DockerResponseServerError {
                        status_code,
                        message,
                    }) => {
                        let missing = status_code == 404 || is_missing_image(&message);
                        return Err(pull_error(image, &message, missing));
                    }
                    Err(e) => return Err(pull_error(image, &e.to_string(), false)),
                }
            }
            Ok(())
        })
        .await;

        match pulled {
            Ok(Ok(())) => {
                info!("Successfully pulled image: {}", image);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Failed to pull image {}: {}", image, e);
                Err(e)
            }
            Err(_) => Err(RunnerError::engine(format!(
                "pull of {} timed out after {:?}",
                image, self.pull_timeout
            ))),
        }
    }

    async fn create_container(&self, spec: &RunSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: format!("fnbox-{}", spec.run_id),
            platform: None,
        };

        let response = self
            .client
            .create_container(Some(options), Self::container_config(spec))
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => RunnerError::ImageNotFound(spec.image.clone()),
                _ => {
                    error!("Failed to create container: {}", e);
                    RunnerError::engine(format!("failed to create container: {}", e))
                }
            })?;

        debug!("Created container {} for run {}", response.id, spec.run_id);
        Ok(response.id)
    }

    async fn start_and_wait(
        &self,
        container_id: &str,
        deadline: Option<Duration>,
    ) -> Result<CapturedOutput> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                error!("Failed to start container {}: {}", container_id, e);
                RunnerError::engine(format!("failed to start container: {}", e))
            })?;

        let exit = match deadline {
            Some(after) => {
                match tokio::time::timeout(after, self.wait_for_exit(container_id)).await {
                    Ok(exit) => exit,
                    Err(_) => {
                        warn!(
                            "Container {} exceeded deadline of {:?}, tearing down",
                            container_id, after
                        );
                        let output = self.collect_logs(container_id).await;
                        return Err(RunnerError::Timeout { after, output });
                    }
                }
            }
            None => self.wait_for_exit(container_id).await,
        };

        let output = self.collect_logs(container_id).await;
        match exit {
            Ok(0) => Ok(output),
            Ok(exit_code) => {
                info!("Container {} exited with status {}", container_id, exit_code);
                Err(RunnerError::NonZeroExit { exit_code, output })
            }
            Err(message) => {
                error!("Container {} failed: {}", container_id, message);
                Err(RunnerError::Engine { message, output })
            }
        }
    }

    /// Block until the container stops; yields its exit code
    async fn wait_for_exit(&self, container_id: &str) -> std::result::Result<i64, String> {
        let mut stream = self
            .client
            .wait_container(container_id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.to_string()),
            None => Err("wait stream ended without an exit status".to_string()),
        }
    }

    async fn collect_logs(&self, container_id: &str) -> CapturedOutput {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut output = CapturedOutput::default();
        let mut stream = self.client.logs(container_id, Some(options));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    output.stdout.extend_from_slice(&message)
                }
                Ok(LogOutput::StdErr { message }) => output.stderr.extend_from_slice(&message),
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    warn!("Error reading logs of container {}: {}", container_id, e);
                    break;
                }
            }
        }
        output
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        match self
            .client
            .remove_container(container_id, Some(force_remove_options()))
            .await
        {
            Ok(()) => {
                debug!("Removed container {}", container_id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Container {} already removed", container_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove container {}: {}", container_id, e);
                Err(RunnerError::engine(format!("failed to remove container: {}", e)))
            }
        }
    }
}

/// Registry answers meaning the image reference does not resolve
fn is_missing_image(message: &str) -> bool {
    let message = message.to_lowercase();
    [
        "not found",
        "manifest unknown",
        "pull access denied",
        "does not exist",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

fn pull_error(image: &str, reason: &str, missing: bool) -> RunnerError {
    if missing {
        RunnerError::ImageNotFound(format!("{}: {}", image, reason))
    } else {
        RunnerError::engine(format!("failed to pull image {}: {}", image, reason))
    }
}

/// Combine a run's result with the outcome of removing its container.
///
/// A run only succeeds if its container is gone afterwards; a failed removal
/// turns success into an engine error that keeps the captured output.
fn settle_teardown(
    result: Result<CapturedOutput>,
    removal: Result<()>,
) -> Result<CapturedOutput> {
    match (result, removal) {
        (Ok(output), Err(e)) => Err(RunnerError::Engine {
            message: format!("container teardown failed: {}", e),
            output,
        }),
        (result, _) => result,
    }
}

fn force_remove_options() -> RemoveContainerOptions {
    RemoveContainerOptions {
        force: true,
        v: true,
        ..Default::default()
    }
}

/// Removes the container if the run future is dropped before its own
/// teardown completed.
struct ContainerGuard {
    client: Docker,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(client: Docker, container_id: String) -> Self {
        Self {
            client,
            container_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let client = self.client.clone();
        let container_id = std::mem::take(&mut self.container_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Removing container {} from an abandoned run", container_id);
                handle.spawn(async move {
                    if let Err(e) = client
                        .remove_container(&container_id, Some(force_remove_options()))
                        .await
                    {
                        error!("Failed to remove container {}: {}", container_id, e);
                    }
                });
            }
            Err(_) => error!(
                "Container {} left behind: no runtime available to remove it",
                container_id
            ),
        }
    }
}

#[async_trait]
impl SandboxRunner for DockerRunner {
    fn engine_name(&self) -> &'static str {
        "docker"
    }

    async fn is_available(&self) -> bool {
        match self.client.ping().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Docker not available: {}", e);
                false
            }
        }
    }

    async fn run(&self, spec: &RunSpec) -> Result<CapturedOutput> {
        info!(
            "Running image '{}' with command {:?} (mount: {} -> {})",
            spec.image,
            spec.command,
            spec.mount_source.display(),
            SANDBOX_MOUNT_PATH
        );

        self.ensure_image(&spec.image).await?;
        let container_id = self.create_container(spec).await?;
        let mut guard = ContainerGuard::new(self.client.clone(), container_id.clone());

        let result = self.start_and_wait(&container_id, spec.deadline).await;

        let removal = self.remove_container(&container_id).await;
        if removal.is_ok() {
            guard.disarm();
        }

        settle_teardown(result, removal)
    }
}
