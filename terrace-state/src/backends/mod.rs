//! State backends

mod local;

pub use local::LocalBackend;
