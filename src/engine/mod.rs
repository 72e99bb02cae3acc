//! engine
//!
//! Reconciles every target of a [`MigrationPlan`] toward the desired state.
//!
//! # Architecture
//!
//! ```text
//! runner --(per target)--> reconcile
//!                            |-- acquire   working tree + lock
//!                            |-- inspect   observed state, no mutation
//!                            |-- exec      branch / commit / push
//!                            `-- forge     pull request
//! ```
//!
//! - [`acquire`]: clone, reuse or open a working tree
//! - [`inspect`]: derive what is already done from git and the provider
//! - [`exec`]: the git actions that close the gap
//! - [`reconcile`]: the per-target state machine
//! - [`runner`]: bounded worker pool, cancellation, run report
//! - [`retry`]: backoff for transient network failures
//! - [`report`]: per-target results and exit status
//!
//! # Invariants
//!
//! - Nothing is persisted between runs. Every run re-derives state.
//! - A failing target never affects another target.
//! - Dev mode performs no mutation: no branch, commit, push or PR call.
//!
//! [`MigrationPlan`]: crate::core::migration::MigrationPlan

pub mod acquire;
pub mod exec;
pub mod inspect;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod runner;

pub use reconcile::{ReconcileError, Reconciler};
pub use report::{
    ErrorKind, ExitStatus, Outcome, PrStep, ReconciliationResult, RunReport, Stage, Steps,
};
pub use retry::RetryPolicy;
pub use runner::{run, Cancellation};

use std::path::PathBuf;
use std::time::Duration;

use crate::git::Actor;

/// Identity used for commits when none is configured.
pub const DEFAULT_ACTOR_NAME: &str = "Code Migration Assistant Agent";
pub const DEFAULT_ACTOR_EMAIL: &str = "code_migration_assistant_agent@gmail.com";

/// Default worker-pool size.
pub const DEFAULT_JOBS: usize = 4;

/// Default deadline for one network call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Run settings derived from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct Context {
    /// Root under which remote targets are cloned.
    pub workspace: PathBuf,
    /// Author and committer of migration commits.
    pub actor: Actor,
    /// Deadline for each clone, fetch, ls-remote, push and PR call.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Targets reconciled concurrently.
    pub jobs: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("remote-targets"),
            actor: Actor {
                name: DEFAULT_ACTOR_NAME.to_string(),
                email: DEFAULT_ACTOR_EMAIL.to_string(),
            },
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            jobs: DEFAULT_JOBS,
        }
    }
}
