//! engine::inspect
//!
//! State inspection: compare a working tree against the desired state
//! without mutating branches, commits or HEAD.
//!
//! # Re-derivation
//!
//! Whether a target is already reconciled is decided by evaluating the
//! replacement rules in memory against the tree the desired branch would
//! have once checked out:
//!
//! 1. the local branch tip, if the branch exists locally
//! 2. else the remote tip, fetched into `refs/remotes/origin/<branch>`
//! 3. else the base the branch would be created from
//!
//! No marker files or notes are written. Uncommitted edits in the working
//! tree are reported separately and never count as reconciled history.
//!
//! The only write this module performs is refreshing the remote-tracking
//! ref of the desired branch when `ls-remote` sees a tip the clone has not
//! fetched yet.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use super::retry::RetryPolicy;
use crate::core::migration::{DesiredBranch, PullRequestSpec};
use crate::core::types::{BranchName, Oid};
use crate::forge::{Forge, ForgeError, PrIdentity, PullRequest};
use crate::git::{Git, GitCli, GitError, RemoteError, ORIGIN};
use crate::replace::{ChangeSummary, ReplacementEngine};

/// Errors from inspection.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("cannot read repository state: {0}")]
    Git(#[from] GitError),

    #[error("cannot query remote: {0}")]
    Remote(#[from] RemoteError),

    #[error("cannot query pull requests: {0}")]
    Forge(#[from] ForgeError),

    /// The base the desired branch would be created from does not exist.
    #[error("base '{0}' not found")]
    BaseNotFound(String),
}

impl InspectError {
    pub fn is_transient(&self) -> bool {
        match self {
            InspectError::Remote(e) => e.is_transient(),
            InspectError::Forge(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Open pull request state for the desired identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrState {
    /// Dev mode, or no pull request configured.
    NotQueried,
    /// No open PR from the source branch.
    None,
    /// An open PR carries the identity.
    OpenMatching(PullRequest),
    /// Another open PR uses the source branch.
    OpenNonMatching(PullRequest),
}

/// Where the desired branch currently lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchState {
    pub local_tip: Option<Oid>,
    /// Tip of `refs/remotes/origin/<branch>`
    pub tracking_tip: Option<Oid>,
    /// Tip on origin, from `ls-remote` when an origin exists
    pub remote_tip: Option<Oid>,
    pub has_origin: bool,
    /// HEAD is already on the desired branch
    pub checked_out: bool,
}

impl BranchState {
    pub fn exists(&self) -> bool {
        self.local_tip.is_some() || self.remote_tip.is_some() || self.tracking_tip.is_some()
    }
}

/// Observed state of one target.
#[derive(Debug, Clone)]
pub struct RepoState {
    pub branch: BranchState,
    /// Commit whose tree was previewed
    pub previewed: Oid,
    pub preview: ChangeSummary,
    /// True iff no file would change
    pub already_reconciled: bool,
    /// Tracked files with uncommitted edits on the desired branch
    pub pending_worktree_changes: Vec<String>,
    pub pull_request: PrState,
    /// Resolved target branch of the PR identity
    pub pr_target_branch: Option<String>,
}

/// Pull request lookup inputs.
pub struct PrQuery<'a> {
    pub forge: &'a dyn Forge,
    pub spec: &'a PullRequestSpec,
}

/// Inspects working trees.
#[derive(Debug, Clone)]
pub struct Inspector {
    cli: GitCli,
    retry: RetryPolicy,
}

impl Inspector {
    pub fn new(cli: GitCli, retry: RetryPolicy) -> Self {
        Self { cli, retry }
    }

    /// Inspect `path` for `target_name` against the desired branch.
    ///
    /// `pr` is `None` in Dev mode or when no pull request is configured.
    pub async fn inspect(
        &self,
        path: &Path,
        target_name: &str,
        desired: &DesiredBranch,
        engine: &ReplacementEngine,
        pr: Option<PrQuery<'_>>,
    ) -> Result<RepoState, InspectError> {
        let mut branch = read_branch_state(path, &desired.name)?;

        if branch.has_origin {
            branch.remote_tip = self.ls_remote(path, &desired.name).await?;
        } else {
            branch.remote_tip = branch.tracking_tip.clone();
        }

        if branch.local_tip.is_none()
            && branch.remote_tip.is_some()
            && branch.tracking_tip != branch.remote_tip
        {
            debug!(branch = %desired.name, "fetching remote branch for inspection");
            self.fetch_branch(path, &desired.name).await?;
            branch.tracking_tip = Git::open(path)?.try_resolve_ref(&desired.name.remote_ref(ORIGIN))?;
        }

        let (previewed, preview, pending) = {
            let git = Git::open(path)?;
            let previewed = match branch.local_tip.clone().or_else(|| branch.tracking_tip.clone()) {
                Some(tip) => tip,
                None => resolve_base(&git, desired.from.as_ref())?,
            };
            let preview = engine.preview(target_name, git.tree_files(&previewed)?);
            let pending = if branch.checked_out {
                git.modified_tracked_files()?
                    .into_iter()
                    .filter(|p| engine.is_eligible(target_name, p))
                    .collect()
            } else {
                Vec::new()
            };
            (previewed, preview, pending)
        };

        let already_reconciled = preview.is_unchanged();
        debug!(
            previewed = %previewed.short(7),
            would_change = preview.changed_count(),
            pending = pending.len(),
            "inspected content"
        );

        let (pull_request, pr_target_branch) = match pr {
            Some(query) => {
                let (state, target) = self.pr_state(query, &desired.name).await?;
                (state, Some(target))
            }
            None => (PrState::NotQueried, None),
        };

        Ok(RepoState {
            branch,
            previewed,
            preview,
            already_reconciled,
            pending_worktree_changes: pending,
            pull_request,
            pr_target_branch,
        })
    }

    /// Authoritative tip of `branch` on origin.
    pub async fn ls_remote(
        &self,
        path: &Path,
        branch: &BranchName,
    ) -> Result<Option<Oid>, RemoteError> {
        let cli = &self.cli;
        self.retry
            .run("ls-remote", move || cli.ls_remote_branch(path, branch))
            .await
    }

    /// Refresh `refs/remotes/origin/<branch>`.
    pub async fn fetch_branch(&self, path: &Path, branch: &BranchName) -> Result<(), RemoteError> {
        let cli = &self.cli;
        self.retry
            .run("fetch", move || cli.fetch_branch(path, branch))
            .await
    }

    async fn pr_state(
        &self,
        query: PrQuery<'_>,
        source: &BranchName,
    ) -> Result<(PrState, String), ForgeError> {
        let forge = query.forge;
        let target = match query.spec.target_branch() {
            Some(b) => b.to_string(),
            None => {
                self.retry
                    .run("default-branch", move || forge.default_branch())
                    .await?
            }
        };

        let identity = PrIdentity::new(source.as_str(), target.as_str(), query.spec.title());
        let head = source.as_str();
        let open = self
            .retry
            .run("list-prs", move || forge.list_open_prs(head))
            .await?;

        Ok((classify_open_prs(&identity, open), identity.target_branch))
    }
}

/// Partition open PRs from the source branch by identity.
pub fn classify_open_prs(identity: &PrIdentity, open: Vec<PullRequest>) -> PrState {
    let mut other = None;
    for pr in open {
        if identity.matches(&pr) {
            return PrState::OpenMatching(pr);
        }
        if other.is_none() {
            other = Some(pr);
        }
    }
    match other {
        Some(pr) => PrState::OpenNonMatching(pr),
        None => PrState::None,
    }
}

fn read_branch_state(path: &Path, branch: &BranchName) -> Result<BranchState, GitError> {
    let git = Git::open(path)?;
    Ok(BranchState {
        local_tip: git.try_resolve_ref(&branch.local_ref())?,
        tracking_tip: git.try_resolve_ref(&branch.remote_ref(ORIGIN))?,
        remote_tip: None,
        has_origin: git.remote_url(ORIGIN)?.is_some(),
        checked_out: git.current_branch()?.as_ref() == Some(branch),
    })
}

/// Commit a new branch starts from: `from` as a local branch, then as
/// `origin/<from>`, then as any revision; HEAD when `from` is absent.
pub fn resolve_base(git: &Git, from: Option<&BranchName>) -> Result<Oid, InspectError> {
    let Some(from) = from else {
        return git
            .head_oid()
            .map_err(|_| InspectError::BaseNotFound("HEAD".to_string()));
    };
    if let Some(oid) = git.try_resolve_ref(&from.local_ref())? {
        return Ok(oid);
    }
    if let Some(oid) = git.try_resolve_ref(&from.remote_ref(ORIGIN))? {
        return Ok(oid);
    }
    git.try_resolve_revision(from.as_str())?
        .ok_or_else(|| InspectError::BaseNotFound(from.to_string()))
}
