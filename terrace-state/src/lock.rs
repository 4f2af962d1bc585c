//! The lock file that serializes `apply` and `destroy` on one state file

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a lock protects the state before another run may take it over
pub const LOCK_TTL_SECS: i64 = 900;

/// Commands that write the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Apply,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Apply => write!(f, "apply"),
            Operation::Destroy => write!(f, "destroy"),
        }
    }
}

/// The process holding a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub user: String,
    pub host: String,
    pub pid: u32,
}

impl Holder {
    /// The running process
    pub fn current() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            user,
            host,
            pid: std::process::id(),
        }
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} (pid {})", self.user, self.host, self.pid)
    }
}

/// Contents of a state lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateLock {
    pub id: String,
    pub operation: Operation,
    /// State file this lock guards
    pub state: PathBuf,
    pub holder: Holder,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StateLock {
    /// A fresh lock held by this process for `operation` on `state`
    pub fn acquire(operation: Operation, state: &Path) -> Self {
        Self::acquire_for(operation, state, Duration::seconds(LOCK_TTL_SECS))
    }

    pub fn acquire_for(operation: Operation, state: &Path, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            state: state.to_path_buf(),
            holder: Holder::current(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// A stale lock was left by a run that never released it
    pub fn is_stale(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn seconds_left(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

impl fmt::Display for StateLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} by {} since {}, expires in {}s",
            self.id,
            self.operation,
            self.state.display(),
            self.holder,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.seconds_left()
        )
    }
}
