//! engine::exec
//!
//! Git actions: branch, commit and push.
//!
//! # Contract
//!
//! - [`ensure_branch`] checks out the desired branch, creating it when it
//!   exists nowhere. Checkout never clobbers conflicting local edits.
//! - [`commit_changes`] authors at most one commit and is a no-op when
//!   nothing differs from HEAD.
//! - [`decide_push`] picks the push mode from the remote tip; [`push`]
//!   performs it. A diverged remote is only overwritten when every commit
//!   it has that we do not was authored by a previous run of this tool.
//!
//! Local `git2` work is synchronous and takes a `&Git`; only [`push`] is
//! async.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use super::inspect::{resolve_base, BranchState, InspectError};
use super::retry::RetryPolicy;
use crate::core::migration::DesiredBranch;
use crate::core::types::{BranchName, Oid};
use crate::git::{Actor, Git, GitCli, GitError, PushMode, RemoteError, ORIGIN};

/// Errors from git actions.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("base '{0}' not found")]
    BaseNotFound(String),

    #[error(transparent)]
    Push(#[from] RemoteError),
}

impl ExecError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Push(e) if e.is_transient())
    }
}

impl From<InspectError> for ExecError {
    fn from(err: InspectError) -> Self {
        match err {
            InspectError::Git(e) => ExecError::Git(e),
            InspectError::Remote(e) => ExecError::Push(e),
            InspectError::BaseNotFound(base) => ExecError::BaseNotFound(base),
            InspectError::Forge(e) => ExecError::Git(GitError::Internal {
                message: e.to_string(),
            }),
        }
    }
}

/// How the local branch came to be checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    /// Already checked out.
    AlreadyCurrent,
    /// Existing local branch checked out.
    CheckedOut,
    /// Local branch created from `origin/<branch>` with upstream set.
    Tracked,
    /// Branch did not exist anywhere; created from the base.
    Created,
}

/// Check out the desired branch, creating it if needed.
pub fn ensure_branch(
    git: &Git,
    desired: &DesiredBranch,
    state: &BranchState,
) -> Result<BranchAction, ExecError> {
    let name = &desired.name;

    if git.current_branch()?.as_ref() == Some(name) {
        return Ok(BranchAction::AlreadyCurrent);
    }

    if git.ref_exists(&name.local_ref()) {
        debug!(branch = %name, "checking out existing branch");
        git.checkout_branch(name)?;
        return Ok(BranchAction::CheckedOut);
    }

    if let Some(tip) = git.try_resolve_ref(&name.remote_ref(ORIGIN))? {
        debug!(branch = %name, tip = %tip.short(7), "creating branch from origin");
        git.create_branch(name, &tip)?;
        git.set_upstream(name, ORIGIN)?;
        git.checkout_branch(name)?;
        return Ok(BranchAction::Tracked);
    }

    if state.remote_tip.is_some() {
        return Err(ExecError::Git(GitError::RefNotFound {
            refname: name.remote_ref(ORIGIN),
        }));
    }

    let base = resolve_base(git, desired.from.as_ref())?;
    info!(branch = %name, base = %base.short(7), "creating branch");
    git.create_branch(name, &base)?;
    git.checkout_branch(name)?;
    Ok(BranchAction::Created)
}

/// Stage `paths` and commit them as one commit.
///
/// Returns `None` without committing when the staged tree equals HEAD.
pub fn commit_changes(
    git: &Git,
    paths: &[String],
    message: &str,
    actor: &Actor,
) -> Result<Option<Oid>, ExecError> {
    if paths.is_empty() {
        return Ok(None);
    }
    git.stage_paths(paths)?;
    if git.worktree_status(false)?.staged == 0 {
        debug!("staged content equals HEAD; nothing to commit");
        return Ok(None);
    }
    let oid = git.commit(message, actor)?;
    info!(commit = %oid.short(7), files = paths.len(), "committed");
    Ok(Some(oid))
}

/// What a push should do, decided against the remote tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDecision {
    /// Remote already has everything.
    UpToDate,
    Push(PushMode),
    /// Remote has unrelated commits; not pushed.
    Diverged { remote_only: usize },
}

/// Decide how to push `branch` given the remote tip.
///
/// The remote tip must be present in the local object store (fetched into
/// the remote-tracking ref) when it is `Some`.
pub fn decide_push(
    git: &Git,
    branch: &BranchName,
    remote_tip: Option<&Oid>,
    actor: &Actor,
    commit_title: &str,
) -> Result<PushDecision, ExecError> {
    let local = git.resolve_ref(&branch.local_ref())?;
    let Some(remote) = remote_tip else {
        return Ok(PushDecision::Push(PushMode::SetUpstream));
    };

    if *remote == local || git.is_ancestor(&local, remote)? {
        return Ok(PushDecision::UpToDate);
    }
    if git.is_ancestor(remote, &local)? {
        return Ok(PushDecision::Push(PushMode::FastForward));
    }

    let remote_only = git.commits_between(&local, remote)?;
    let ours = remote_only
        .iter()
        .all(|c| c.author_email == actor.email && c.summary.trim() == commit_title.trim());
    if ours {
        Ok(PushDecision::Push(PushMode::ForceWithLease {
            expected: remote.clone(),
        }))
    } else {
        Ok(PushDecision::Diverged {
            remote_only: remote_only.len(),
        })
    }
}

/// Push `branch` to origin with retry.
pub async fn push(
    cli: &GitCli,
    retry: &RetryPolicy,
    path: &Path,
    branch: &BranchName,
    mode: &PushMode,
) -> Result<(), ExecError> {
    info!(branch = %branch, ?mode, "pushing");
    retry
        .run("push", move || cli.push(path, branch, mode))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_errors_classify() {
        assert!(ExecError::Push(RemoteError::Network {
            op: "push",
            stderr: "reset".into()
        })
        .is_transient());
        assert!(!ExecError::Push(RemoteError::Rejected {
            op: "push",
            stderr: "stale info".into()
        })
        .is_transient());
        assert!(!ExecError::BaseNotFound("main".into()).is_transient());
    }

    #[test]
    fn inspect_errors_convert() {
        assert!(matches!(
            ExecError::from(InspectError::BaseNotFound("dev".into())),
            ExecError::BaseNotFound(b) if b == "dev"
        ));
    }
}
