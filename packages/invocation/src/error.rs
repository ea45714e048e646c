// ABOUTME: Error types for workspace allocation and staging
// ABOUTME: Separates out-of-space conditions from other filesystem failures

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Raw OS error codes that mean the filesystem cannot allocate more space
const ENOSPC: i32 = 28;
const EDQUOT: i32 = 122;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("No space left to allocate workspace at {path}: {source}")]
    Exhausted {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Workspace I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid staging file name: {0}")]
    InvalidFileName(String),
}

impl WorkspaceError {
    /// Classify an I/O error raised while working under `path`
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if is_out_of_space(&source) {
            WorkspaceError::Exhausted { path, source }
        } else {
            WorkspaceError::Io { path, source }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, WorkspaceError::Exhausted { .. })
    }
}

fn is_out_of_space(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::StorageFull
        || matches!(err.raw_os_error(), Some(ENOSPC) | Some(EDQUOT))
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_space_is_exhausted() {
        let err = WorkspaceError::from_io("/tmp/x", io::Error::from_raw_os_error(ENOSPC));
        assert!(err.is_exhausted());

        let err = WorkspaceError::from_io("/tmp/x", io::Error::from_raw_os_error(EDQUOT));
        assert!(err.is_exhausted());
    }

    #[test]
    fn test_other_io_errors_are_not_exhausted() {
        let err = WorkspaceError::from_io(
            "/tmp/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_exhausted());
        assert!(err.to_string().contains("/tmp/x"));
    }
}
