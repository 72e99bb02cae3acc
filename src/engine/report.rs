//! engine::report
//!
//! Per-target results and the run report.
//!
//! A [`ReconciliationResult`] is the only artifact a run produces. It is
//! rendered by `ui::output` and never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::migration::RunMode;
use crate::core::types::Oid;
use crate::forge::PullRequest;
use crate::replace::ChangeSummary;

/// Reconciliation stages, in order. A result records the last one reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not started.
    Pending,
    Acquired,
    Inspected,
    ContentReady,
    Committed,
    Pushed,
    PrSatisfied,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Acquired => "acquired",
            Stage::Inspected => "inspected",
            Stage::ContentReady => "content_ready",
            Stage::Committed => "committed",
            Stage::Pushed => "pushed",
            Stage::PrSatisfied => "pr_satisfied",
        };
        f.write_str(name)
    }
}

/// Error taxonomy recorded on failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Acquisition,
    Inspection,
    Replacement,
    GitOperation,
    Provider,
    Transient,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Acquisition => "acquisition",
            ErrorKind::Inspection => "inspection",
            ErrorKind::Replacement => "replacement",
            ErrorKind::GitOperation => "git_operation",
            ErrorKind::Provider => "provider",
            ErrorKind::Transient => "transient",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Final outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing had to be mutated.
    NoChangeNeeded,
    /// At least one step mutated the repository or the provider.
    Reconciled,
    /// Dev mode: a Prod run would change content.
    Previewed,
    Failed { kind: ErrorKind, reason: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::NoChangeNeeded => "no_change_needed",
            Outcome::Reconciled => "reconciled",
            Outcome::Previewed => "previewed",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// What happened on the pull request step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PrStep {
    /// No pull request is configured for this target's provider.
    NotConfigured,
    /// The step did not run.
    Skipped { reason: String },
    Created { number: u64, url: String },
    AlreadyExisted { number: u64, url: String },
    /// A matching PR existed and its description was brought up to date.
    Updated { number: u64, url: String },
    /// Another open PR from the same source branch blocks creation.
    Conflict { number: u64, url: String },
}

impl PrStep {
    pub fn created(pr: &PullRequest) -> Self {
        PrStep::Created {
            number: pr.number,
            url: pr.url.clone(),
        }
    }

    pub fn already_existed(pr: &PullRequest) -> Self {
        PrStep::AlreadyExisted {
            number: pr.number,
            url: pr.url.clone(),
        }
    }

    pub fn updated(pr: &PullRequest) -> Self {
        PrStep::Updated {
            number: pr.number,
            url: pr.url.clone(),
        }
    }

    pub fn conflict(pr: &PullRequest) -> Self {
        PrStep::Conflict {
            number: pr.number,
            url: pr.url.clone(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        PrStep::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether the provider was changed.
    pub fn is_mutation(&self) -> bool {
        matches!(self, PrStep::Created { .. } | PrStep::Updated { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PrStep::NotConfigured => "not-configured",
            PrStep::Skipped { .. } => "skipped",
            PrStep::Created { .. } => "created",
            PrStep::AlreadyExisted { .. } => "already-existed",
            PrStep::Updated { .. } => "updated",
            PrStep::Conflict { .. } => "conflict",
        }
    }
}

/// Sub-steps that actually ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Steps {
    pub branch_created: bool,
    /// The commit authored by this run
    pub commit: Option<Oid>,
    pub pushed: bool,
    pub force_with_lease: bool,
    pub pull_request: PrStep,
}

impl Default for Steps {
    fn default() -> Self {
        Self {
            branch_created: false,
            commit: None,
            pushed: false,
            force_with_lease: false,
            pull_request: PrStep::NotConfigured,
        }
    }
}

impl Steps {
    /// Whether any step changed local or remote state.
    pub fn mutated(&self) -> bool {
        self.branch_created
            || self.commit.is_some()
            || self.pushed
            || self.pull_request.is_mutation()
    }
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub target: String,
    pub outcome: Outcome,
    pub stage: Stage,
    pub steps: Steps,
    /// Changes found (Dev) or applied (Prod)
    pub summary: ChangeSummary,
    pub warnings: Vec<String>,
}

impl ReconciliationResult {
    /// A target that never started.
    pub fn not_started(target: impl Into<String>, kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            outcome: Outcome::Failed {
                kind,
                reason: reason.into(),
            },
            stage: Stage::Pending,
            steps: Steps::default(),
            summary: ChangeSummary::default(),
            warnings: Vec::new(),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Everything a run produced, in configuration order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ReconciliationResult>,
}

/// Process exit status derived from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    Failed = 1,
    ConfigError = 2,
    Warnings = 3,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failed()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.results.iter().map(|r| r.warnings.len()).sum()
    }

    /// Configuration rejections take precedence over run-time failures,
    /// which take precedence over warnings.
    pub fn exit_status(&self) -> ExitStatus {
        if self
            .results
            .iter()
            .any(|r| r.error_kind() == Some(ErrorKind::Configuration))
        {
            ExitStatus::ConfigError
        } else if self.failed_count() > 0 {
            ExitStatus::Failed
        } else if self.warning_count() > 0 {
            ExitStatus::Warnings
        } else {
            ExitStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Outcome, warnings: Vec<String>) -> ReconciliationResult {
        ReconciliationResult {
            target: "svc".into(),
            outcome,
            stage: Stage::PrSatisfied,
            steps: Steps::default(),
            summary: ChangeSummary::default(),
            warnings,
        }
    }

    fn report(results: Vec<ReconciliationResult>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            mode: RunMode::Prod,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results,
        }
    }

    mod exit_status {
        use super::*;

        #[test]
        fn clean_run_succeeds() {
            let r = report(vec![
                result(Outcome::Reconciled, vec![]),
                result(Outcome::NoChangeNeeded, vec![]),
            ]);
            assert_eq!(r.exit_status(), ExitStatus::Success);
            assert_eq!(r.exit_status().code(), 0);
        }

        #[test]
        fn runtime_failure_is_one() {
            let r = report(vec![
                result(Outcome::Reconciled, vec![]),
                result(
                    Outcome::Failed {
                        kind: ErrorKind::Transient,
                        reason: "timeout".into(),
                    },
                    vec![],
                ),
            ]);
            assert_eq!(r.exit_status().code(), 1);
        }

        #[test]
        fn configuration_rejection_is_two() {
            let r = report(vec![
                result(
                    Outcome::Failed {
                        kind: ErrorKind::GitOperation,
                        reason: "x".into(),
                    },
                    vec![],
                ),
                ReconciliationResult::not_started("bad", ErrorKind::Configuration, "mismatch"),
            ]);
            assert_eq!(r.exit_status(), ExitStatus::ConfigError);
        }

        #[test]
        fn warnings_are_three() {
            let r = report(vec![result(
                Outcome::Reconciled,
                vec!["diverged".into()],
            )]);
            assert_eq!(r.exit_status(), ExitStatus::Warnings);
        }
    }

    mod steps {
        use super::*;

        #[test]
        fn default_is_not_mutated() {
            assert!(!Steps::default().mutated());
        }

        #[test]
        fn existing_pr_is_not_a_mutation() {
            let pr = PullRequest {
                number: 3,
                url: "u".into(),
                head: "h".into(),
                base: "b".into(),
                title: "t".into(),
                body: None,
            };
            let mut steps = Steps::default();
            steps.pull_request = PrStep::already_existed(&pr);
            assert!(!steps.mutated());
            steps.pull_request = PrStep::updated(&pr);
            assert!(steps.mutated());
        }
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::Failed {
            kind: ErrorKind::Provider,
            reason: "denied".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "provider");
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Pending < Stage::Acquired);
        assert!(Stage::Pushed < Stage::PrSatisfied);
        assert_eq!(Stage::ContentReady.to_string(), "content_ready");
    }
}
