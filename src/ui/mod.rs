//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Report rendering: per-target lines, the pattern summary
//!   table, and JSON
//!
//! # Design
//!
//! All stdout output goes through this module so `--quiet` and `--json`
//! are honored in one place.

pub mod output;
