//! converge - idempotent pattern-based code migration across repositories
//!
//! converge applies one set of regex replacements to many git repositories
//! and drives each of them to the same end state: a migration branch with
//! the changes committed, pushed to origin, and one open pull request on
//! Azure DevOps or GitHub. Every run re-derives what is already done from
//! the repositories and the provider, so running again after a partial
//! failure only finishes what is missing.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Per-target reconciliation and the bounded worker pool
//! - [`core`] - Strong types, configuration and the validated plan
//! - [`replace`] - Pattern replacement over working trees and git trees
//! - [`git`] - Single interface for all Git operations
//! - [`forge`] - Pull request providers behind one trait
//! - [`ui`] - Report rendering
//! - [`telemetry`] - Logging setup
//!
//! # Guarantees
//!
//! 1. A second run over an unchanged configuration mutates nothing
//! 2. Dev mode never creates a branch, commit, push or pull request
//! 3. Excluded files are never modified
//! 4. One failing target never affects another

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod git;
pub mod replace;
pub mod telemetry;
pub mod ui;
