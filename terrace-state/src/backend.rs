//! Where the state lives and how access to it is serialized

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::lock::{Operation, StateLock};
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("State is locked: {0}")]
    Locked(Box<StateLock>),

    #[error("No lock is held on {}", .0.display())]
    NotLocked(PathBuf),

    /// The lock on disk is not the one being released
    #[error("Lock {found} is not {expected}")]
    ForeignLock { expected: String, found: String },

    /// Refusing to overwrite the state of a different deployment
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("Failed to parse {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    /// `map_err` adapter for file operations on `path`
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `None` before the first apply
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Replace the stored state. Fails when the stored lineage differs.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Take the lock, replacing a stale one
    async fn acquire_lock(&self, operation: Operation) -> BackendResult<StateLock>;

    async fn release_lock(&self, lock: &StateLock) -> BackendResult<()>;

    /// Remove the lock `lock_id` regardless of who holds it
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;

    /// Create whatever has to exist before the first write
    async fn init(&self) -> BackendResult<()>;

    fn location(&self) -> String;
}
