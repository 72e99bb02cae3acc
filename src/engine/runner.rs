//! engine::runner
//!
//! Runs every target of a plan and collects the run report.
//!
//! # Scheduling
//!
//! Ready targets are spawned on a `JoinSet` and gated by a semaphore of
//! `jobs` permits. Results land in index-ordered slots, so the report
//! follows configuration order no matter which target finishes first.
//! Targets rejected at setup never start and are reported as
//! configuration failures.
//!
//! # Cancellation
//!
//! [`Cancellation`] wraps a `watch` flag. Once set, targets that have not
//! yet taken a permit report `cancelled` at stage `pending`. Targets
//! already in flight run to the end of their reconciliation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::reconcile::{ReconcileError, Reconciler};
use super::report::{ErrorKind, ReconciliationResult, RunReport};
use super::Context;
use crate::core::migration::{MigrationPlan, TargetSetup};
use crate::forge::ForgeFactory;

/// Run-wide abort flag.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Cancel when the process receives Ctrl-C.
    ///
    /// The listener runs until aborted; abort the handle once the run is over.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight targets, skipping the rest");
                this.cancel();
            }
        })
    }
}

/// Reconcile every target of `plan`.
///
/// Never fails as a whole: each target's failure is recorded in its result.
pub async fn run(
    plan: &MigrationPlan,
    ctx: &Context,
    forges: Arc<dyn ForgeFactory>,
    cancel: &Cancellation,
) -> RunReport {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(
        %run_id,
        mode = %plan.mode,
        targets = plan.targets.len(),
        jobs = ctx.jobs,
        "run started"
    );

    let reconciler = Arc::new(Reconciler::new(plan, ctx, forges));
    let permits = Arc::new(Semaphore::new(ctx.jobs.max(1)));
    let mut slots: Vec<Option<ReconciliationResult>> = vec![None; plan.targets.len()];
    let mut join_set = JoinSet::new();

    for (idx, setup) in plan.targets.iter().enumerate() {
        let target = match setup {
            TargetSetup::Ready(target) => target.clone(),
            TargetSetup::Rejected { name, reason } => {
                warn!(target = %name, reason = %reason, "target rejected at setup");
                slots[idx] = Some(ReconciliationResult::not_started(
                    name.clone(),
                    ErrorKind::Configuration,
                    reason.clone(),
                ));
                continue;
            }
        };

        let reconciler = Arc::clone(&reconciler);
        let permits = Arc::clone(&permits);
        let cancelled = cancel.subscribe();
        join_set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            if *cancelled.borrow() {
                let err = ReconcileError::Cancelled;
                return (
                    idx,
                    ReconciliationResult::not_started(target.name.to_string(), err.kind(), err.to_string()),
                );
            }
            (idx, reconciler.reconcile(&target).await)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(err) => error!(error = %err, "reconcile task aborted"),
        }
    }

    let results: Vec<ReconciliationResult> = slots
        .into_iter()
        .zip(&plan.targets)
        .map(|(slot, setup)| {
            slot.unwrap_or_else(|| {
                ReconciliationResult::not_started(
                    setup.name(),
                    ErrorKind::Cancelled,
                    "reconciliation task aborted before reporting",
                )
            })
        })
        .collect();

    let report = RunReport {
        run_id,
        mode: plan.mode,
        started_at,
        finished_at: Utc::now(),
        results,
    };
    info!(
        %run_id,
        failed = report.failed_count(),
        warnings = report.warning_count(),
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "run finished"
    );
    report
}
