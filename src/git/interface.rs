//! git::interface
//!
//! Local repository access using git2.
//!
//! # Architecture
//!
//! The `Git` struct wraps a `git2::Repository` and is the only type in the
//! crate that touches libgit2. Network operations (clone, fetch, ls-remote,
//! push) live in [`super::remote`] and go through the git CLI instead.
//!
//! `git2::Repository` is `Send` but not `Sync`, so a `Git` is opened, used
//! and dropped inside synchronous code; async callers never hold one across
//! an `.await`.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Path is not a repository
//! - [`GitError::NotWorktreeRoot`]: Path is inside a repository but not its root
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::CheckoutConflict`]: Checkout would overwrite local edits
//!
//! # Example
//!
//! ```ignore
//! use converge::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/repos/svc"))?;
//! let oid = git.resolve_ref("refs/heads/main")?;
//! println!("main is at {}", oid.short(7));
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{BranchName, Oid, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Path is not a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo { path: PathBuf },

    /// Path is inside a repository but is not its working-tree root.
    #[error("{path} is not the root of its working tree ({root})")]
    NotWorktreeRoot { path: PathBuf, root: PathBuf },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound { refname: String },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound { oid: String },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid { oid: String },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName { message: String },

    /// Checkout refused because it would clobber local changes.
    #[error("checkout of '{branch}' would overwrite local changes: {message}")]
    CheckoutConflict { branch: String, message: String },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError { message: String },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal { message: String },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") || context == "HEAD" {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn internal(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidBranchName(msg) | TypeError::InvalidTargetName(msg) => {
                GitError::InvalidRefName { message: msg }
            }
        }
    }
}

/// Summary of working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// Number of staged changes
    pub staged: usize,
    /// Number of unstaged changes to tracked files
    pub unstaged: usize,
    /// Number of untracked files (if requested)
    pub untracked: usize,
    /// Whether there are unresolved conflicts
    pub has_conflicts: bool,
}

impl WorktreeStatus {
    /// Check if the worktree is completely clean (no changes at all).
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.unstaged == 0 && !self.has_conflicts
    }
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub oid: Oid,
    /// First line of the commit message
    pub summary: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: chrono::DateTime<chrono::Utc>,
}

/// Identity used for authored commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub email: String,
}

/// Local repository handle.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

fn to_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(|e| e.into())
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open the repository whose working tree is rooted at `path`.
    ///
    /// Unlike discovery, this refuses subdirectories of a repository: a
    /// target must name the root of the tree it migrates.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not inside a repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    /// - [`GitError::NotWorktreeRoot`] if `path` is below the root
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        let workdir = repo.workdir().ok_or(GitError::BareRepo)?;

        let wanted = path.canonicalize().map_err(|e| GitError::AccessError {
            message: format!("{}: {}", path.display(), e),
        })?;
        let root = workdir.canonicalize().map_err(|e| GitError::AccessError {
            message: format!("{}: {}", workdir.display(), e),
        })?;
        if wanted != root {
            return Err(GitError::NotWorktreeRoot {
                path: path.to_path_buf(),
                root,
            });
        }

        Ok(Self { repo })
    }

    /// Path to the working tree root.
    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    // =========================================================================
    // Working Tree Status
    // =========================================================================

    /// Get working tree status summary.
    pub fn worktree_status(&self, include_untracked: bool) -> Result<WorktreeStatus, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(include_untracked)
            .include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(GitError::internal)?;

        let mut result = WorktreeStatus::default();

        for entry in statuses.iter() {
            let status = entry.status();

            if status.is_conflicted() {
                result.has_conflicts = true;
            }

            if status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange()
            {
                result.staged += 1;
            }

            if status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange()
            {
                result.unstaged += 1;
            }

            if status.is_wt_new() {
                result.untracked += 1;
            }
        }

        Ok(result)
    }

    /// Tracked files whose content differs from HEAD, staged or not.
    ///
    /// Deletions are left out; the engine never deletes files.
    pub fn modified_tracked_files(&self) -> Result<Vec<String>, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(GitError::internal)?;

        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| {
                let s = entry.status();
                s.is_wt_modified() || s.is_index_modified()
            })
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        paths.sort();
        Ok(paths)
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?;

        to_oid(commit.id())
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve any revision expression (`main`, `v1.2`, a sha) to a commit.
    pub fn try_resolve_revision(&self, spec: &str) -> Result<Option<Oid>, GitError> {
        let object = match self.repo.revparse_single(spec) {
            Ok(object) => object,
            Err(e)
                if e.code() == git2::ErrorCode::NotFound
                    || e.code() == git2::ErrorCode::InvalidSpec
                    || e.code() == git2::ErrorCode::Ambiguous =>
            {
                return Ok(None)
            }
            Err(e) => return Err(GitError::from_git2(e, spec)),
        };
        match object.peel_to_commit() {
            Ok(commit) => Ok(Some(to_oid(commit.id())?)),
            Err(_) => Ok(None),
        }
    }

    /// Get HEAD commit OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if HEAD is unborn (new repository)
    pub fn head_oid(&self) -> Result<Oid, GitError> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        let commit = head
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        to_oid(commit.id())
    }

    /// Check if a ref exists.
    pub fn ref_exists(&self, refname: &str) -> bool {
        self.repo.find_reference(refname).is_ok()
    }

    /// Get the current branch name, if on a branch.
    ///
    /// Returns `None` if HEAD is detached or unborn.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }

        Ok(None)
    }

    /// Upstream of a local branch as a full ref name, if configured.
    pub fn upstream_ref(&self, branch: &BranchName) -> Result<Option<String>, GitError> {
        let local = match self
            .repo
            .find_branch(branch.as_str(), git2::BranchType::Local)
        {
            Ok(b) => b,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, &branch.local_ref())),
        };
        match local.upstream() {
            Ok(upstream) => Ok(upstream.get().name().map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, &branch.local_ref())),
        }
    }

    // =========================================================================
    // Branch Mutation
    // =========================================================================

    /// Create a local branch at `target`. Fails if it already exists.
    pub fn create_branch(&self, branch: &BranchName, target: &Oid) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(target)?)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        self.repo
            .branch(branch.as_str(), &commit, false)
            .map_err(|e| GitError::from_git2(e, &branch.local_ref()))?;
        Ok(())
    }

    /// Set `<remote>/<branch>` as the upstream of a local branch.
    pub fn set_upstream(&self, branch: &BranchName, remote: &str) -> Result<(), GitError> {
        let mut local = self
            .repo
            .find_branch(branch.as_str(), git2::BranchType::Local)
            .map_err(|e| GitError::from_git2(e, &branch.local_ref()))?;
        local
            .set_upstream(Some(&format!("{}/{}", remote, branch.as_str())))
            .map_err(|e| GitError::from_git2(e, &branch.remote_ref(remote)))
    }

    /// Check out a local branch, refusing to overwrite conflicting edits.
    ///
    /// Uncommitted changes that do not conflict are carried over, as with
    /// `git checkout`.
    pub fn checkout_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        let refname = branch.local_ref();
        let reference = self
            .repo
            .find_reference(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        let tree = reference
            .peel_to_tree()
            .map_err(|e| GitError::from_git2(e, &refname))?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::CheckoutConflict {
                branch: branch.to_string(),
                message: e.message().to_string(),
            })?;

        self.repo
            .set_head(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))
    }

    /// Move the checked-out branch forward to `target`, updating the
    /// working tree safely.
    pub fn fast_forward_head(&self, target: &Oid) -> Result<(), GitError> {
        let branch = self
            .current_branch()?
            .ok_or_else(|| GitError::InvalidRefName {
                message: "HEAD is detached; cannot fast-forward".to_string(),
            })?;

        let commit = self
            .repo
            .find_commit(to_git2(target)?)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::CheckoutConflict {
                branch: branch.to_string(),
                message: e.message().to_string(),
            })?;

        self.repo
            .reference(
                &branch.local_ref(),
                commit.id(),
                true,
                "converge: fast-forward to upstream",
            )
            .map_err(|e| GitError::from_git2(e, &branch.local_ref()))?;
        Ok(())
    }

    // =========================================================================
    // Index and Commits
    // =========================================================================

    /// Paths of regular tracked files, from the index, sorted.
    pub fn tracked_files(&self) -> Result<Vec<String>, GitError> {
        let index = self.repo.index().map_err(GitError::internal)?;
        let mut paths: Vec<String> = index
            .iter()
            .filter(|entry| is_regular_file_mode(entry.mode))
            .filter_map(|entry| String::from_utf8(entry.path).ok())
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Stage the given worktree paths.
    pub fn stage_paths(&self, paths: &[String]) -> Result<(), GitError> {
        let mut index = self.repo.index().map_err(GitError::internal)?;
        for path in paths {
            index
                .add_path(Path::new(path))
                .map_err(|e| GitError::from_git2(e, path))?;
        }
        index.write().map_err(GitError::internal)
    }

    /// Commit the index on top of HEAD, authored and committed by `actor`.
    pub fn commit(&self, message: &str, actor: &Actor) -> Result<Oid, GitError> {
        let signature = git2::Signature::now(&actor.name, &actor.email).map_err(|e| {
            GitError::Internal {
                message: format!("invalid actor identity: {}", e.message()),
            }
        })?;

        let mut index = self.repo.index().map_err(GitError::internal)?;
        let tree_id = index.write_tree().map_err(GitError::internal)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| GitError::from_git2(e, &tree_id.to_string()))?;

        let parent = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        let oid = self
            .repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &[&parent],
            )
            .map_err(GitError::internal)?;

        to_oid(oid)
    }

    /// Regular files of a commit's tree as `(path, contents)`, sorted by path.
    pub fn tree_files(&self, commit: &Oid) -> Result<Vec<(String, Vec<u8>)>, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(commit)?)
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        let tree = commit.tree().map_err(GitError::internal)?;

        let mut files = Vec::new();
        let mut failure = None;
        let walked = tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(git2::ObjectType::Blob)
                || !is_regular_file_mode(entry.filemode() as u32)
            {
                return git2::TreeWalkResult::Ok;
            }
            let Some(name) = entry.name() else {
                return git2::TreeWalkResult::Ok;
            };
            match self.repo.find_blob(entry.id()) {
                Ok(blob) => {
                    files.push((format!("{dir}{name}"), blob.content().to_vec()));
                    git2::TreeWalkResult::Ok
                }
                Err(e) => {
                    failure = Some(GitError::from_git2(e, &entry.id().to_string()));
                    git2::TreeWalkResult::Abort
                }
            }
        });

        if let Some(err) = failure {
            return Err(err);
        }
        walked.map_err(GitError::internal)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    // =========================================================================
    // Ancestry
    // =========================================================================

    /// Check if `ancestor` is an ancestor of `descendant`.
    ///
    /// Returns true if ancestor == descendant.
    pub fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }

        self.repo
            .graph_descendant_of(to_git2(descendant)?, to_git2(ancestor)?)
            .map_err(GitError::internal)
    }

    /// Commits reachable from `tip` but not from `base`, newest first.
    pub fn commits_between(&self, base: &Oid, tip: &Oid) -> Result<Vec<CommitInfo>, GitError> {
        let mut revwalk = self.repo.revwalk().map_err(GitError::internal)?;
        revwalk.push(to_git2(tip)?).map_err(GitError::internal)?;
        revwalk.hide(to_git2(base)?).map_err(GitError::internal)?;

        revwalk
            .map(|oid| {
                let oid = oid.map_err(GitError::internal)?;
                self.commit_info(&to_oid(oid)?)
            })
            .collect()
    }

    /// Count commits reachable from `tip` but not from `base`.
    pub fn commit_count(&self, base: &Oid, tip: &Oid) -> Result<usize, GitError> {
        let mut revwalk = self.repo.revwalk().map_err(GitError::internal)?;
        revwalk.push(to_git2(tip)?).map_err(GitError::internal)?;
        revwalk.hide(to_git2(base)?).map_err(GitError::internal)?;
        Ok(revwalk.count())
    }

    /// Get information about a commit.
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        let author = commit.author();
        let author_time = chrono::DateTime::from_timestamp(author.when().seconds(), 0)
            .unwrap_or(chrono::DateTime::UNIX_EPOCH)
            .with_timezone(&chrono::Utc);

        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            author_time,
        })
    }

    // =========================================================================
    // Remotes
    // =========================================================================

    /// Get the URL for a remote, or `None` if the remote doesn't exist.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::internal(e)),
        }
    }
}

/// Blob (0o100644) or executable blob (0o100755).
fn is_regular_file_mode(mode: u32) -> bool {
    mode == 0o100644 || mode == 0o100755
}

/// Compare two clone URLs, ignoring a trailing `.git` and slash.
pub fn same_remote_url(a: &str, b: &str) -> bool {
    fn norm(url: &str) -> &str {
        let url = url.trim().trim_end_matches('/');
        url.strip_suffix(".git").unwrap_or(url)
    }
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_comparison_ignores_git_suffix() {
        assert!(same_remote_url(
            "https://github.com/acme/svc.git",
            "https://github.com/acme/svc"
        ));
        assert!(same_remote_url("/srv/origin.git/", "/srv/origin"));
        assert!(!same_remote_url(
            "https://github.com/acme/svc",
            "https://github.com/acme/other"
        ));
    }

    #[test]
    fn regular_modes() {
        assert!(is_regular_file_mode(0o100644));
        assert!(is_regular_file_mode(0o100755));
        assert!(!is_regular_file_mode(0o120000));
        assert!(!is_regular_file_mode(0o160000));
    }

    #[test]
    fn type_errors_map_to_git_errors() {
        let err: GitError = TypeError::InvalidOid("x".into()).into();
        assert!(matches!(err, GitError::InvalidOid { .. }));
    }
}
