//! Terrace State Management
//!
//! Persists what has been provisioned between invocations: provider
//! identifiers, observed attributes, the binding and dependencies each
//! resource was applied with, and the published outputs.
//!
//! # Overview
//!
//! - **StateFile**: The main state structure containing all managed resources
//! - **StateBackend**: storage for the state file and its lock (local file)
//! - **StateLock**: who holds the state, for which operation, until when
//!
//! # Example
//!
//! ```ignore
//! use terrace_state::{LocalBackend, Operation, StateBackend};
//!
//! let backend = LocalBackend::new("terrace.state.json");
//!
//! let lock = backend.acquire_lock(Operation::Apply).await?;
//! let state = backend.read_state().await?.unwrap_or_default();
//! // ... apply, record resources ...
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use lock::{Holder, Operation, StateLock};
pub use state::{ResourceState, StateFile};
