// ABOUTME: Invocation pipeline sequencing fetch, staging, sandboxed run and cleanup
// ABOUTME: Records the state path, classifies every failure and always releases the workspace

use fnbox_config::{PipelineConfig, SandboxConfig};
use fnbox_sandbox::{CapturedOutput, RunSpec, SandboxRunner};
use fnbox_storage::ArtifactStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::types::{ExecutionResult, InvocationReport, InvocationRequest, InvocationState, Outcome};
use crate::workspace::{Workspace, WorkspaceManager};

/// Composes the artifact store, sandbox runner and workspace manager into
/// one request lifecycle.
///
/// Adapters are optional: a missing adapter makes every invocation fail
/// with `ServiceUnavailable` before any workspace is allocated.
pub struct InvocationPipeline {
    store: Option<Arc<dyn ArtifactStore>>,
    runner: Option<Arc<dyn SandboxRunner>>,
    workspaces: Arc<WorkspaceManager>,
    admission: Option<Arc<Semaphore>>,
    max_concurrent: Option<usize>,
    run_timeout: Option<Duration>,
}

impl InvocationPipeline {
    pub fn new(
        store: Option<Arc<dyn ArtifactStore>>,
        runner: Option<Arc<dyn SandboxRunner>>,
        workspaces: Arc<WorkspaceManager>,
    ) -> Self {
        Self {
            store,
            runner,
            workspaces,
            admission: None,
            max_concurrent: None,
            run_timeout: None,
        }
    }

    pub fn from_config(
        store: Option<Arc<dyn ArtifactStore>>,
        runner: Option<Arc<dyn SandboxRunner>>,
        pipeline: &PipelineConfig,
        sandbox: &SandboxConfig,
    ) -> Self {
        let workspaces = Arc::new(WorkspaceManager::new(&pipeline.workspace_root));
        let mut this = Self::new(store, runner, workspaces).with_run_timeout(sandbox.run_timeout);
        if let Some(max) = pipeline.max_concurrent_invocations {
            this = this.with_max_concurrent(max);
        }
        this
    }

    /// Admit at most `max` invocations at once; excess requests fail with
    /// `ServiceUnavailable` instead of queueing.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.admission = Some(Arc::new(Semaphore::new(max)));
        self.max_concurrent = Some(max);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn ArtifactStore>> {
        self.store.as_ref()
    }

    pub fn runner(&self) -> Option<&Arc<dyn SandboxRunner>> {
        self.runner.as_ref()
    }

    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    /// Run one invocation to a terminal state. Never fails: every error is
    /// classified into the report's outcome.
    pub async fn invoke(&self, request: InvocationRequest) -> InvocationReport {
        let invocation_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "invocation",
            invocation_id = %invocation_id,
            key = %request.artifact_key,
            namespace = %request.namespace
        );

        self.invoke_inner(invocation_id, request)
            .instrument(span)
            .await
    }

    async fn invoke_inner(&self, invocation_id: String, request: InvocationRequest) -> InvocationReport {
        let mut run = Lifecycle::new(invocation_id);
        info!("Invocation received");

        let (store, runner) = match (&self.store, &self.runner) {
            (Some(store), Some(runner)) => (store.clone(), runner.clone()),
            (None, _) => {
                return run.finish(
                    Outcome::ServiceUnavailable("artifact store is not configured".to_string()),
                    CapturedOutput::default(),
                )
            }
            (_, None) => {
                return run.finish(
                    Outcome::ServiceUnavailable("sandbox runner is not configured".to_string()),
                    CapturedOutput::default(),
                )
            }
        };

        let _permit = match self.admit() {
            Ok(permit) => permit,
            Err(outcome) => return run.finish(outcome, CapturedOutput::default()),
        };

        let mut workspace = match self.workspaces.acquire().await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Failed to acquire workspace: {}", e);
                return run.finish(Outcome::from(&e), CapturedOutput::default());
            }
        };
        run.workspace_root = Some(workspace.root().to_path_buf());

        let (outcome, output) = self
            .execute(&mut run, &request, &workspace, store.as_ref(), runner.as_ref())
            .await;

        run.enter(InvocationState::CleaningUp);
        if let Err(e) = workspace.release().await {
            // The drop guard retries on the way out
            warn!("Failed to release workspace: {}", e);
        }

        run.finish(outcome, output)
    }

    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, Outcome> {
        let Some(semaphore) = &self.admission else {
            return Ok(None);
        };
        match semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                warn!("Invocation rejected: concurrency limit reached");
                Err(Outcome::ServiceUnavailable(format!(
                    "concurrency limit of {} invocations reached",
                    self.max_concurrent.unwrap_or_default()
                )))
            }
        }
    }

    /// Fetch, stage and run. Returns the outcome and whatever output was
    /// captured; the caller owns cleanup.
    async fn execute(
        &self,
        run: &mut Lifecycle,
        request: &InvocationRequest,
        workspace: &Workspace,
        store: &dyn ArtifactStore,
        runner: &dyn SandboxRunner,
    ) -> (Outcome, CapturedOutput) {
        run.enter(InvocationState::Fetching);
        let bytes = match store.fetch(&request.namespace, &request.artifact_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Fetch failed: {}", e);
                return (Outcome::from(e), CapturedOutput::default());
            }
        };

        if let Err(e) = workspace.stage(&request.entrypoint, &bytes).await {
            error!("Failed to stage artifact: {}", e);
            return (Outcome::from(&e), CapturedOutput::default());
        }
        run.enter(InvocationState::Staged);

        let spec = RunSpec {
            run_id: run.invocation_id.clone(),
            image: request.image.clone(),
            command: request.command.clone(),
            mount_source: workspace.root().to_path_buf(),
            deadline: self.run_timeout,
        };

        run.enter(InvocationState::Running);
        let result = runner.run(&spec).await;
        run.enter(InvocationState::Captured);

        match result {
            Ok(output) => (Outcome::Success, output),
            Err(e) => {
                warn!("Sandbox run failed: {}", e);
                let outcome = Outcome::from(&e);
                (outcome, e.into_partial_output())
            }
        }
    }
}

/// State path of one invocation
struct Lifecycle {
    invocation_id: String,
    states: Vec<InvocationState>,
    workspace_root: Option<std::path::PathBuf>,
}

impl Lifecycle {
    fn new(invocation_id: String) -> Self {
        Self {
            invocation_id,
            states: vec![InvocationState::Received],
            workspace_root: None,
        }
    }

    fn enter(&mut self, state: InvocationState) {
        debug!("Invocation state -> {:?}", state);
        self.states.push(state);
    }

    fn finish(mut self, outcome: Outcome, output: CapturedOutput) -> InvocationReport {
        let terminal = if outcome.is_success() {
            InvocationState::Completed
        } else {
            InvocationState::Failed
        };
        self.enter(terminal);

        if outcome.is_success() {
            info!("Invocation completed");
        } else {
            info!(code = outcome.code(), "Invocation failed: {}", outcome);
        }

        InvocationReport {
            invocation_id: self.invocation_id,
            result: ExecutionResult::new(outcome, output),
            states: self.states,
            workspace_root: self.workspace_root,
        }
    }
}
