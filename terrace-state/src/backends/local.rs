//! State in a local JSON file, locked by a sibling `.lock` file

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::{Operation, StateLock};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    /// Backend for the state file at `state_path`; the lock sits beside it
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn read_lock(&self) -> BackendResult<Option<StateLock>> {
        let content = match fs::read_to_string(&self.lock_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io("read", &self.lock_path)(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| BackendError::Corrupt {
                path: self.lock_path.clone(),
                source,
            })
    }

    fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path).map_err(BackendError::io("remove", &self.lock_path))
    }

    /// Write `lock` only if no lock file exists
    fn create_lock(&self, lock: &StateLock) -> BackendResult<bool> {
        let content = serde_json::to_vec_pretty(lock)
            .map_err(std::io::Error::from)
            .map_err(BackendError::io("serialize", &self.lock_path))?;
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(BackendError::io("create", &self.lock_path)(e)),
        };
        file.write_all(&content)
            .map_err(BackendError::io("write", &self.lock_path))?;
        Ok(true)
    }
}

fn ensure_parent(path: &Path) -> BackendResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(BackendError::io("create", parent))?;
    }
    Ok(())
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io("read", &self.state_path)(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| BackendError::Corrupt {
                path: self.state_path.clone(),
                source,
            })
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(existing) = self.read_state().await?
            && existing.lineage != state.lineage
        {
            return Err(BackendError::LineageMismatch {
                expected: existing.lineage,
                actual: state.lineage.clone(),
            });
        }

        let tmp_path = self.state_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)
            .map_err(std::io::Error::from)
            .map_err(BackendError::io("serialize", &tmp_path))?;
        fs::write(&tmp_path, content).map_err(BackendError::io("write", &tmp_path))?;
        fs::rename(&tmp_path, &self.state_path)
            .map_err(BackendError::io("replace", &self.state_path))?;

        log::debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: Operation) -> BackendResult<StateLock> {
        ensure_parent(&self.lock_path)?;
        if let Some(existing) = self.read_lock()? {
            if !existing.is_stale() {
                return Err(BackendError::Locked(Box::new(existing)));
            }
            log::warn!("Taking over stale lock {}", existing);
            self.remove_lock()?;
        }

        let lock = StateLock::acquire(operation, &self.state_path);
        if !self.create_lock(&lock)? {
            // Another run got there between the check and the write
            return match self.read_lock()? {
                Some(winner) => Err(BackendError::Locked(Box::new(winner))),
                None => Err(BackendError::NotLocked(self.state_path.clone())),
            };
        }

        log::debug!("Acquired lock {}", lock);
        Ok(lock)
    }

    async fn release_lock(&self, lock: &StateLock) -> BackendResult<()> {
        let Some(existing) = self.read_lock()? else {
            return Err(BackendError::NotLocked(self.state_path.clone()));
        };
        if existing.id != lock.id {
            return Err(BackendError::ForeignLock {
                expected: lock.id.clone(),
                found: existing.id,
            });
        }
        self.remove_lock()
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock() {
            Ok(None) => Err(BackendError::NotLocked(self.state_path.clone())),
            Ok(Some(existing)) if existing.id != lock_id => Err(BackendError::ForeignLock {
                expected: lock_id.to_string(),
                found: existing.id,
            }),
            Ok(Some(_)) => self.remove_lock(),
            Err(BackendError::Corrupt { .. }) => {
                log::warn!("Removing unreadable lock file {}", self.lock_path.display());
                self.remove_lock()
            }
            Err(e) => Err(e),
        }
    }

    async fn init(&self) -> BackendResult<()> {
        ensure_parent(&self.state_path)
    }

    fn location(&self) -> String {
        self.state_path.display().to_string()
    }
}
