//! engine::acquire
//!
//! Repository acquisition: turn a target into a locked working tree.
//!
//! # Sources
//!
//! - `Local`: opened in place. The path must be the root of a non-bare
//!   working tree. Its lock lives in the workspace, not in the repository.
//! - `Remote`: cloned into `<workspace>/<dir>`, where `<dir>` is derived
//!   from the target name. The clone is built in `<workspace>/.<dir>.partial`
//!   and renamed into place once complete. An existing clone of the same remote is reused
//!   after a fetch, and fast-forwarded when it is strictly behind its
//!   upstream. Local commits are never discarded.
//!
//! # Invariants
//!
//! - A directory that is not a clone of the target's remote is never
//!   touched
//! - The working tree stays locked until the [`WorkingTree`] is dropped

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use crate::core::migration::{MigrationTarget, SourceKind};
use crate::core::ops::lock::{LockError, WorkspaceLock};
use crate::git::{same_remote_url, Git, GitCli, GitError, RemoteError, ORIGIN};

/// Errors from acquisition.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("source path does not exist: {0}")]
    MissingPath(PathBuf),

    #[error("cannot open repository: {0}")]
    Git(#[from] GitError),

    #[error(transparent)]
    Locked(#[from] LockError),

    #[error("{path} exists but is not a clone of {expected} (origin: {found})")]
    ForeignDirectory {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("cannot prepare workspace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AcquireError::Remote(e) if e.is_transient())
    }
}

/// A working tree ready for reconciliation.
#[derive(Debug)]
pub struct WorkingTree {
    path: PathBuf,
    /// Whether this run created the clone
    fresh_clone: bool,
    _lock: WorkspaceLock,
}

impl WorkingTree {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_fresh_clone(&self) -> bool {
        self.fresh_clone
    }
}

/// Directory name for a remote target's clone.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, leading dots are
/// dropped, and the first 8 hex digits of the SHA-256 of the raw name are
/// appended.
///
/// ```
/// use converge::engine::acquire::clone_dir_name;
///
/// let dir = clone_dir_name("team/payments api");
/// assert!(dir.starts_with("team_payments_api-"));
/// assert_ne!(clone_dir_name("a/b"), clone_dir_name("a_b"));
/// ```
pub fn clone_dir_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let digest = Sha256::digest(name.as_bytes());
    let suffix = &hex::encode(digest)[..8];
    if sanitized.is_empty() {
        format!("target-{}", suffix)
    } else {
        format!("{}-{}", sanitized, suffix)
    }
}

/// Acquires working trees for targets.
#[derive(Debug, Clone)]
pub struct Acquirer {
    workspace: PathBuf,
    cli: GitCli,
    retry: RetryPolicy,
}

impl Acquirer {
    pub fn new(workspace: impl Into<PathBuf>, cli: GitCli, retry: RetryPolicy) -> Self {
        Self {
            workspace: workspace.into(),
            cli,
            retry,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Acquire the working tree of `target`.
    pub async fn acquire(&self, target: &MigrationTarget) -> Result<WorkingTree, AcquireError> {
        match target.source_kind {
            SourceKind::Local => self.open_local(Path::new(&target.source)),
            SourceKind::Remote => self.acquire_remote(target).await,
        }
    }

    fn open_local(&self, path: &Path) -> Result<WorkingTree, AcquireError> {
        if !path.exists() {
            return Err(AcquireError::MissingPath(path.to_path_buf()));
        }
        Git::open(path)?;
        let canonical = fs::canonicalize(path).map_err(|source| AcquireError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let key = &hex::encode(Sha256::digest(canonical.to_string_lossy().as_bytes()))[..16];
        let lock = WorkspaceLock::acquire(WorkspaceLock::path_for_local(&self.workspace, key))?;
        debug!(path = %path.display(), "opened local working tree");
        Ok(WorkingTree {
            path: path.to_path_buf(),
            fresh_clone: false,
            _lock: lock,
        })
    }

    async fn acquire_remote(&self, target: &MigrationTarget) -> Result<WorkingTree, AcquireError> {
        fs::create_dir_all(&self.workspace).map_err(|source| AcquireError::Io {
            path: self.workspace.clone(),
            source,
        })?;

        let dir_name = clone_dir_name(target.name.as_str());
        let lock = WorkspaceLock::acquire(WorkspaceLock::path_for_clone(&self.workspace, &dir_name))?;
        let dest = self.workspace.join(&dir_name);

        if is_empty_or_absent(&dest) {
            info!(source = %target.source, dest = %dest.display(), "cloning");
            let staging = self.workspace.join(format!(".{dir_name}.partial"));
            self.clone_staged(&target.source, &staging, &dest).await?;
            return Ok(WorkingTree {
                path: dest,
                fresh_clone: true,
                _lock: lock,
            });
        }

        check_existing_clone(&dest, &target.source)?;

        debug!(dest = %dest.display(), "reusing existing clone");
        let (cli, path) = (&self.cli, dest.as_path());
        self.retry.run("fetch", move || cli.fetch(path)).await?;
        fast_forward_if_behind(&dest)?;

        Ok(WorkingTree {
            path: dest,
            fresh_clone: false,
            _lock: lock,
        })
    }

    /// Clone into `staging`, then move the finished clone to `dest`.
    ///
    /// A failed attempt leaves nothing behind, so each retry starts from an
    /// empty directory and `dest` only ever holds a complete clone.
    async fn clone_staged(&self, url: &str, staging: &Path, dest: &Path) -> Result<(), AcquireError> {
        remove_dir_if_present(staging)?;
        let cli = &self.cli;
        self.retry
            .run("clone", move || async move {
                let attempt = cli.clone_repo(url, staging).await;
                if attempt.is_err() {
                    if let Err(e) = remove_dir_if_present(staging) {
                        warn!(error = %e, "could not remove partial clone");
                    }
                }
                attempt
            })
            .await?;

        let io = |source| AcquireError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if dest.exists() {
            fs::remove_dir(dest).map_err(io)?;
        }
        fs::rename(staging, dest).map_err(io)?;
        Ok(())
    }
}

fn remove_dir_if_present(path: &Path) -> Result<(), AcquireError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AcquireError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn is_empty_or_absent(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => !path.exists(),
    }
}

/// The directory must be a working tree whose origin is `source`.
fn check_existing_clone(dest: &Path, source: &str) -> Result<(), AcquireError> {
    let foreign = |found: String| AcquireError::ForeignDirectory {
        path: dest.to_path_buf(),
        expected: source.to_string(),
        found,
    };
    let git = Git::open(dest).map_err(|e| foreign(e.to_string()))?;
    match git.remote_url(ORIGIN)? {
        Some(url) if same_remote_url(&url, source) => Ok(()),
        Some(url) => Err(foreign(url)),
        None => Err(foreign("<none>".to_string())),
    }
}

/// Fast-forward the checked-out branch when it is strictly behind its
/// upstream. Branches that are ahead or diverged are left alone.
fn fast_forward_if_behind(dest: &Path) -> Result<(), AcquireError> {
    let git = Git::open(dest)?;
    let Some(branch) = git.current_branch()? else {
        return Ok(());
    };
    let Some(upstream) = git.upstream_ref(&branch)? else {
        return Ok(());
    };
    let Some(upstream_tip) = git.try_resolve_ref(&upstream)? else {
        return Ok(());
    };
    let head = git.head_oid()?;

    if head == upstream_tip {
        return Ok(());
    }
    if git.is_ancestor(&head, &upstream_tip)? {
        info!(branch = %branch, to = %upstream_tip.short(7), "fast-forwarding to upstream");
        git.fast_forward_head(&upstream_tip)?;
    } else {
        debug!(branch = %branch, "local commits not on upstream; keeping them");
    }
    Ok(())
}
