//! core::ops
//!
//! Cross-process coordination for working copies.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive lock held while a target is reconciled

pub mod lock;

pub use lock::{LockError, WorkspaceLock};
