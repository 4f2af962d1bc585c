//! Terrace Core
//!
//! Desired-state engine and the declaration of a two-tier network topology:
//! a public application instance and a private database instance, wired
//! together through deferred values that resolve as resources are created.

pub mod config;
pub mod deferred;
pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod providers;
pub mod resolve;
pub mod resource;
pub mod schema;
pub mod scripts;
pub mod simulator;
pub mod ssh_config;
pub mod topology;
pub mod userdata;
