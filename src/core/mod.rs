//! core
//!
//! Domain types, configuration and the validated migration plan.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, TargetName
//! - [`config`] - Migration document schema and loading
//! - [`migration`] - Validated, read-only run inputs
//! - [`credentials`] - Provider tokens from the environment
//! - [`ops`] - Working-copy locking

pub mod config;
pub mod credentials;
pub mod migration;
pub mod ops;
pub mod types;
