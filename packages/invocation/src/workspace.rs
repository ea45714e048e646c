// ABOUTME: Per-invocation staging directories with guaranteed removal
// ABOUTME: Unique allocation under a shared root, idempotent release, drop guard and orphan sweep

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, WorkspaceError};

/// Directory name prefix identifying workspaces owned by this manager
pub const WORKSPACE_PREFIX: &str = "faas_code_";

/// Directory names of workspaces whose owner has not released them yet
#[derive(Debug, Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn insert(&self, name: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    fn remove(&self, name: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn contains(&self, name: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Allocates isolated staging directories under one root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    in_flight: InFlight,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: InFlight::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of acquired workspaces not yet released or dropped
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Create a fresh, uniquely named workspace directory.
    ///
    /// The directory is created with `create_dir`, which fails rather than
    /// reusing an existing path, so concurrent callers never share one.
    pub async fn acquire(&self) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| WorkspaceError::from_io(&self.root, e))?;

        let id = Uuid::new_v4().simple().to_string();
        let dir_name = format!("{}{}", WORKSPACE_PREFIX, id);
        let path = self.root.join(&dir_name);

        // Registered before the directory exists so a concurrent sweep never sees it unowned
        self.in_flight.insert(&dir_name);
        if let Err(e) = tokio::fs::create_dir(&path).await {
            self.in_flight.remove(&dir_name);
            return Err(WorkspaceError::from_io(&path, e));
        }

        debug!("Acquired workspace {}", path.display());
        Ok(Workspace {
            id,
            root: path,
            dir_name,
            released: false,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Remove workspace directories older than `grace` that no live
    /// [`Workspace`] from this manager owns, such as those left behind by a
    /// process that died before cleanup.
    pub async fn sweep_orphans(&self, grace: Duration) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::from_io(&self.root, e)),
        };

        let now = SystemTime::now();
        let mut removed = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::from_io(&self.root, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(WORKSPACE_PREFIX) || self.in_flight.contains(&name) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => metadata,
                Ok(_) => continue,
                // Released concurrently
                Err(_) => continue,
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < grace {
                continue;
            }

            let path = entry.path();
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!("Removed orphaned workspace {} (age {:?})", path.display(), age);
                    removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove orphaned workspace {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}

/// Run `sweep_orphans` on a fixed interval for the life of the process
pub fn start_sweep_task(
    manager: Arc<WorkspaceManager>,
    interval: Duration,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "Started workspace sweep task (interval: {:?}, grace: {:?})",
            interval, grace
        );

        loop {
            ticker.tick().await;

            match manager.sweep_orphans(grace).await {
                Ok(removed) => {
                    if !removed.is_empty() {
                        info!("Swept {} orphaned workspaces", removed.len());
                    }
                }
                Err(e) => {
                    error!("Error during workspace sweep: {}", e);
                }
            }
        }
    })
}

/// One invocation's staging directory.
///
/// Owned by exactly one invocation. Dropping it without calling
/// [`Workspace::release`] removes the directory synchronously, so cancelled
/// or panicking invocations still clean up.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    root: PathBuf,
    dir_name: String,
    released: bool,
    in_flight: InFlight,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Write `bytes` to `file_name` directly inside the workspace root
    pub async fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if file_name.is_empty()
            || file_name == "."
            || file_name == ".."
            || file_name.contains(['/', '\\'])
        {
            return Err(WorkspaceError::InvalidFileName(file_name.to_string()));
        }

        let path = self.root.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| WorkspaceError::from_io(&path, e))?;

        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Remove the directory and everything in it. Safe to call repeatedly.
    pub async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WorkspaceError::from_io(&self.root, e)),
        }

        self.released = true;
        self.in_flight.remove(&self.dir_name);
        debug!("Released workspace {}", self.root.display());
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.in_flight.remove(&self.dir_name);
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => warn!("Workspace {} removed on drop", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(
                "Failed to remove workspace {} on drop: {}",
                self.root.display(),
                e
            ),
        }
    }
}
