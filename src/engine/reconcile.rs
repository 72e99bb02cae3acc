//! engine::reconcile
//!
//! Per-target state machine.
//!
//! ```text
//! Pending -> Acquired -> Inspected -> ContentReady -> Committed -> Pushed -> PrSatisfied
//! ```
//!
//! Each transition runs only the work the inspected state says is missing.
//! Any error stops the target at the stage it reached; there is no
//! rollback, and the next run picks up from whatever was left behind.
//!
//! Dev mode stops after `Inspected`.
//!
//! # Send
//!
//! `Git` handles are opened in synchronous blocks and dropped before the
//! next `.await`, so the future returned by [`Reconciler::reconcile`] is
//! `Send` and can be spawned.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use super::acquire::{AcquireError, Acquirer};
use super::exec::{commit_changes, decide_push, ensure_branch, push, BranchAction, ExecError, PushDecision};
use super::inspect::{InspectError, Inspector, PrQuery, PrState, RepoState};
use super::report::{ErrorKind, Outcome, PrStep, ReconciliationResult, Stage, Steps};
use super::retry::RetryPolicy;
use super::Context;
use crate::core::migration::{
    CommitSpec, DesiredBranch, MigrationPlan, MigrationTarget, PullRequestSpec, RunMode,
};
use crate::forge::{CreatePrRequest, Forge, ForgeError, ForgeFactory, PrIdentity, PullRequest, UpdatePrRequest};
use crate::git::{Actor, Git, GitCli, GitError, PushMode, ORIGIN};
use crate::replace::{ChangeSummary, ReplacementEngine, ReplacementError};

/// Why a target failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("acquisition failed: {0}")]
    Acquisition(String),

    #[error("inspection failed: {0}")]
    Inspection(String),

    #[error("replacement failed: {0}")]
    Replacement(String),

    #[error("git operation failed: {0}")]
    GitOperation(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("transient failure after retries: {0}")]
    Transient(String),

    #[error("run cancelled before this target started")]
    Cancelled,
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Configuration(_) => ErrorKind::Configuration,
            ReconcileError::Acquisition(_) => ErrorKind::Acquisition,
            ReconcileError::Inspection(_) => ErrorKind::Inspection,
            ReconcileError::Replacement(_) => ErrorKind::Replacement,
            ReconcileError::GitOperation(_) => ErrorKind::GitOperation,
            ReconcileError::Provider(_) => ErrorKind::Provider,
            ReconcileError::Transient(_) => ErrorKind::Transient,
            ReconcileError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Map a provider error from a PR call.
    pub fn from_forge(err: ForgeError) -> Self {
        if err.is_transient() {
            ReconcileError::Transient(err.to_string())
        } else {
            ReconcileError::Provider(err.to_string())
        }
    }

    /// Map a failure to build the forge for a target.
    fn from_forge_setup(err: ForgeError) -> Self {
        ReconcileError::Configuration(err.to_string())
    }
}

impl From<AcquireError> for ReconcileError {
    fn from(err: AcquireError) -> Self {
        if err.is_transient() {
            ReconcileError::Transient(err.to_string())
        } else {
            ReconcileError::Acquisition(err.to_string())
        }
    }
}

impl From<InspectError> for ReconcileError {
    fn from(err: InspectError) -> Self {
        if err.is_transient() {
            return ReconcileError::Transient(err.to_string());
        }
        match err {
            InspectError::BaseNotFound(_) => ReconcileError::GitOperation(err.to_string()),
            other => ReconcileError::Inspection(other.to_string()),
        }
    }
}

impl From<ExecError> for ReconcileError {
    fn from(err: ExecError) -> Self {
        if err.is_transient() {
            ReconcileError::Transient(err.to_string())
        } else {
            ReconcileError::GitOperation(err.to_string())
        }
    }
}

impl From<GitError> for ReconcileError {
    fn from(err: GitError) -> Self {
        ReconcileError::GitOperation(err.to_string())
    }
}

impl From<ReplacementError> for ReconcileError {
    fn from(err: ReplacementError) -> Self {
        ReconcileError::Replacement(err.to_string())
    }
}

/// Mutable record of how far a target got.
#[derive(Debug, Default)]
struct Progress {
    stage: Option<Stage>,
    steps: Steps,
    summary: ChangeSummary,
    warnings: Vec<String>,
    /// Dev mode found content to change
    would_change: bool,
}

impl Progress {
    fn reach(&mut self, stage: Stage) {
        debug!(%stage, "stage reached");
        self.stage = Some(stage);
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Drives one target to the desired state.
pub struct Reconciler {
    mode: RunMode,
    branch: DesiredBranch,
    commit: CommitSpec,
    engine: Arc<ReplacementEngine>,
    actor: Actor,
    cli: GitCli,
    retry: RetryPolicy,
    acquirer: Acquirer,
    inspector: Inspector,
    forges: Arc<dyn ForgeFactory>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("mode", &self.mode)
            .field("branch", &self.branch)
            .field("actor", &self.actor)
            .finish()
    }
}

impl Reconciler {
    pub fn new(plan: &MigrationPlan, ctx: &Context, forges: Arc<dyn ForgeFactory>) -> Self {
        let cli = GitCli::new(ctx.timeout);
        Self {
            mode: plan.mode,
            branch: plan.branch.clone(),
            commit: plan.commit.clone(),
            engine: Arc::clone(&plan.engine),
            actor: ctx.actor.clone(),
            acquirer: Acquirer::new(ctx.workspace.clone(), cli.clone(), ctx.retry.clone()),
            inspector: Inspector::new(cli.clone(), ctx.retry.clone()),
            cli,
            retry: ctx.retry.clone(),
            forges,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Reconcile one target. Never fails; failures are part of the result.
    pub async fn reconcile(&self, target: &MigrationTarget) -> ReconciliationResult {
        let span = info_span!("reconcile", target = %target.name);
        async move {
            let mut progress = Progress::default();
            let result = self.run(target, &mut progress).await;
            let stage = progress.stage.unwrap_or(Stage::Pending);

            let outcome = match result {
                Err(err) => {
                    warn!(%stage, kind = %err.kind(), error = %err, "target failed");
                    Outcome::Failed {
                        kind: err.kind(),
                        reason: err.to_string(),
                    }
                }
                Ok(()) if self.mode == RunMode::Dev => {
                    if progress.would_change {
                        Outcome::Previewed
                    } else {
                        Outcome::NoChangeNeeded
                    }
                }
                Ok(()) if progress.steps.mutated() => Outcome::Reconciled,
                Ok(()) => Outcome::NoChangeNeeded,
            };
            info!(outcome = outcome.label(), %stage, "target finished");

            ReconciliationResult {
                target: target.name.to_string(),
                outcome,
                stage,
                steps: progress.steps,
                summary: progress.summary,
                warnings: progress.warnings,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, target: &MigrationTarget, p: &mut Progress) -> Result<(), ReconcileError> {
        let name = target.name.as_str();

        let forge: Option<Arc<dyn Forge>> = match (self.mode, &target.pull_request) {
            (RunMode::Prod, Some(_)) => Some(
                self.forges
                    .forge_for(target)
                    .map_err(ReconcileError::from_forge_setup)?,
            ),
            _ => None,
        };
        if target.pull_request.is_some() && self.mode == RunMode::Dev {
            p.steps.pull_request = PrStep::skipped("dev mode");
        }

        // Acquired
        let tree = self.acquirer.acquire(target).await?;
        p.reach(Stage::Acquired);
        let path = tree.path();

        // Inspected
        let query = match (&forge, &target.pull_request) {
            (Some(forge), Some(spec)) => Some(PrQuery {
                forge: forge.as_ref(),
                spec,
            }),
            _ => None,
        };
        let state = self
            .inspector
            .inspect(path, name, &self.branch, &self.engine, query)
            .await?;
        p.reach(Stage::Inspected);
        p.summary = state.preview.clone();
        p.would_change = !state.already_reconciled;

        if self.mode == RunMode::Dev {
            return Ok(());
        }

        // ContentReady
        let (action, applied) = {
            let git = Git::open(path)?;
            let action = ensure_branch(&git, &self.branch, &state.branch)?;
            let applied = if state.already_reconciled {
                None
            } else {
                Some(self.engine.apply(path, name, &git.tracked_files()?)?)
            };
            (action, applied)
        };
        p.steps.branch_created = action == BranchAction::Created;
        if let Some(summary) = applied {
            p.summary = summary;
        }
        p.reach(Stage::ContentReady);

        // Committed
        let mut paths: Vec<String> = p.summary.changed_files().map(str::to_string).collect();
        paths.extend(state.pending_worktree_changes.iter().cloned());
        paths.sort();
        paths.dedup();
        p.steps.commit = {
            let git = Git::open(path)?;
            commit_changes(&git, &paths, &self.commit.message(), &self.actor)?
        };
        p.reach(Stage::Committed);

        // Pushed
        if !state.branch.has_origin {
            p.warn(format!("{}: no '{}' remote; push skipped", name, ORIGIN));
            if target.pull_request.is_some() {
                p.steps.pull_request = PrStep::skipped("branch not pushed");
            }
            return Ok(());
        }
        if !self.push_step(path, p).await? {
            if target.pull_request.is_some() {
                p.steps.pull_request = PrStep::skipped("push refused");
            }
            return Ok(());
        }
        p.reach(Stage::Pushed);

        // PrSatisfied
        if let (Some(forge), Some(spec)) = (forge, &target.pull_request) {
            p.steps.pull_request = self.pr_step(forge.as_ref(), spec, &state, p).await?;
            p.reach(Stage::PrSatisfied);
        }
        Ok(())
    }

    /// Push if the remote lacks local commits. Returns whether origin now
    /// carries the local branch.
    async fn push_step(&self, path: &Path, p: &mut Progress) -> Result<bool, ReconcileError> {
        let branch = &self.branch.name;

        let remote_tip = self
            .inspector
            .ls_remote(path, branch)
            .await
            .map_err(InspectError::from)?;
        if let Some(tip) = &remote_tip {
            let tracked = Git::open(path)?.try_resolve_ref(&branch.remote_ref(ORIGIN))?;
            if tracked.as_ref() != Some(tip) {
                self.inspector
                    .fetch_branch(path, branch)
                    .await
                    .map_err(InspectError::from)?;
            }
        }

        let decision = {
            let git = Git::open(path)?;
            decide_push(
                &git,
                branch,
                remote_tip.as_ref(),
                &self.actor,
                &self.commit.title,
            )?
        };

        match decision {
            PushDecision::UpToDate => {
                debug!(branch = %branch, "origin is up to date");
                Ok(true)
            }
            PushDecision::Push(mode) => {
                push(&self.cli, &self.retry, path, branch, &mode).await?;
                p.steps.pushed = true;
                p.steps.force_with_lease = matches!(mode, PushMode::ForceWithLease { .. });
                Ok(true)
            }
            PushDecision::Diverged { remote_only } => {
                p.warn(format!(
                    "'{}' on origin has {} commit(s) not made by this tool; push refused, \
                     needs operator attention",
                    branch, remote_only
                ));
                Ok(false)
            }
        }
    }

    async fn pr_step(
        &self,
        forge: &dyn Forge,
        spec: &PullRequestSpec,
        state: &RepoState,
        p: &mut Progress,
    ) -> Result<PrStep, ReconcileError> {
        let target_branch = match &state.pr_target_branch {
            Some(b) => b.clone(),
            None => {
                self.retry
                    .run("default-branch", move || forge.default_branch())
                    .await
                    .map_err(ReconcileError::from_forge)?
            }
        };
        let identity = PrIdentity::new(self.branch.name.as_str(), target_branch, spec.title());

        match &state.pull_request {
            PrState::OpenMatching(pr) => self.refresh_description(forge, spec, pr).await,
            PrState::OpenNonMatching(pr) => {
                p.warn(format!(
                    "open PR #{} from '{}' does not match (base '{}', title '{}'); not creating another",
                    pr.number, identity.source_branch, pr.base, pr.title
                ));
                Ok(PrStep::conflict(pr))
            }
            PrState::None | PrState::NotQueried => {
                let request = create_request(spec, &identity);
                let (identity, request) = (&identity, &request);
                let created = self
                    .retry
                    .run("create-pr", move || async move {
                        // A timed-out create may have landed; look again first.
                        match forge.find_matching_pr(identity).await {
                            Ok(Some(existing)) => Ok(Err(existing)),
                            Ok(None) => forge.create_pr(request.clone()).await.map(Ok),
                            Err(err) => Err(err),
                        }
                    })
                    .await
                    .map_err(ReconcileError::from_forge)?;

                match created {
                    Ok(created) => {
                        info!(number = created.pr.number, url = %created.pr.url, "created pull request");
                        for warning in created.warnings {
                            p.warn(warning);
                        }
                        Ok(PrStep::created(&created.pr))
                    }
                    Err(existing) => Ok(PrStep::already_existed(&existing)),
                }
            }
        }
    }

    /// An existing matching PR is satisfied; its description is brought in
    /// line with the configured one when they differ.
    async fn refresh_description(
        &self,
        forge: &dyn Forge,
        spec: &PullRequestSpec,
        pr: &PullRequest,
    ) -> Result<PrStep, ReconcileError> {
        let Some(wanted) = spec.body() else {
            return Ok(PrStep::already_existed(pr));
        };
        if normalize_body(pr.body.as_deref().unwrap_or("")) == normalize_body(wanted) {
            return Ok(PrStep::already_existed(pr));
        }

        let request = UpdatePrRequest {
            number: pr.number,
            body: Some(wanted.to_string()),
        };
        let request = &request;
        let updated = self
            .retry
            .run("update-pr", move || forge.update_pr(request.clone()))
            .await
            .map_err(ReconcileError::from_forge)?;
        info!(number = updated.number, "updated pull request description");
        Ok(PrStep::updated(&updated))
    }
}

fn normalize_body(body: &str) -> String {
    body.replace("\r\n", "\n").trim().to_string()
}

fn create_request(spec: &PullRequestSpec, identity: &PrIdentity) -> CreatePrRequest {
    let mut request = CreatePrRequest {
        head: identity.source_branch.clone(),
        base: identity.target_branch.clone(),
        title: spec.title().to_string(),
        body: spec.body().map(str::to_string),
        ..Default::default()
    };
    match spec {
        PullRequestSpec::AzureDevOps(ado) => {
            request.labels = ado.labels.clone();
            request.work_item_ids = ado.work_item_refs.clone();
        }
        PullRequestSpec::GitHub(gh) => {
            request.maintainer_can_modify = gh.maintainer_can_modify;
        }
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::migration::{AzureDevOpsPrSpec, GitHubPrSpec};
    use crate::git::RemoteError;

    mod error_mapping {
        use super::*;

        #[test]
        fn transient_remote_errors_become_transient() {
            let err: ReconcileError = AcquireError::Remote(RemoteError::Timeout {
                op: "clone",
                secs: 180,
            })
            .into();
            assert_eq!(err.kind(), ErrorKind::Transient);
        }

        #[test]
        fn auth_failures_are_acquisition_errors() {
            let err: ReconcileError = AcquireError::Remote(RemoteError::Auth {
                op: "clone",
                stderr: "denied".into(),
            })
            .into();
            assert_eq!(err.kind(), ErrorKind::Acquisition);
            assert!(err.to_string().contains("authentication failed"));
        }

        #[test]
        fn missing_base_is_a_git_operation_error() {
            let err: ReconcileError = InspectError::BaseNotFound("release".into()).into();
            assert_eq!(err.kind(), ErrorKind::GitOperation);
        }

        #[test]
        fn provider_errors() {
            assert_eq!(
                ReconcileError::from_forge(ForgeError::AuthFailed("x".into())).kind(),
                ErrorKind::Provider
            );
            assert_eq!(
                ReconcileError::from_forge(ForgeError::RateLimited).kind(),
                ErrorKind::Transient
            );
            assert_eq!(
                ReconcileError::from_forge_setup(ForgeError::AuthRequired("GITHUB_TOKEN".into()))
                    .kind(),
                ErrorKind::Configuration
            );
        }
    }

    mod create_request {
        use super::*;

        #[test]
        fn azure_carries_labels_and_work_items() {
            let spec = PullRequestSpec::AzureDevOps(AzureDevOpsPrSpec {
                title: "Feat: Code Migration".into(),
                description: Some("body".into()),
                target_ref_name: None,
                labels: vec!["migration".into()],
                work_item_refs: vec!["42".into()],
            });
            let id = PrIdentity::new("feat/code-migration", "main", "Feat: Code Migration");
            let req = create_request(&spec, &id);
            assert_eq!(req.head, "feat/code-migration");
            assert_eq!(req.base, "main");
            assert_eq!(req.labels, vec!["migration".to_string()]);
            assert_eq!(req.work_item_ids, vec!["42".to_string()]);
            assert!(req.maintainer_can_modify.is_none());
        }

        #[test]
        fn github_carries_maintainer_flag() {
            let spec = PullRequestSpec::GitHub(GitHubPrSpec {
                title: "T".into(),
                body: None,
                base: None,
                maintainer_can_modify: Some(true),
            });
            let req = create_request(&spec, &PrIdentity::new("b", "main", "T"));
            assert_eq!(req.maintainer_can_modify, Some(true));
            assert!(req.labels.is_empty());
            assert!(req.body.is_none());
        }
    }

    #[test]
    fn body_normalization_ignores_line_endings() {
        assert_eq!(normalize_body("a\r\nb\n"), normalize_body("a\nb"));
        assert_ne!(normalize_body("a"), normalize_body("b"));
    }
}
