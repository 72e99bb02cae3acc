//! core::ops::lock
//!
//! Exclusive lock on a target's working copy.
//!
//! Two runs that share a workspace directory must not reconcile the same
//! clone at the same time. Each target holds a [`WorkspaceLock`] from
//! acquisition until its reconciliation finishes.
//!
//! # Storage
//!
//! - Remote targets: `<workspace>/.<dir>.lock`, next to the clone
//! - Local targets: `<workspace>/.local-<key>.lock`, where `<key>` is
//!   derived from the repository's canonical path. Nothing is written into
//!   the repository itself
//!
//! # Invariants
//!
//! - Acquisition is non-blocking; a held lock fails the target fast
//! - The lock is released on drop

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("working copy is locked by another run ({0})")]
    AlreadyLocked(PathBuf),

    /// Failed to create lock file or its directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive lock guarding one working copy.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    file: Option<File>,
}

impl WorkspaceLock {
    /// Lock file used for a clone living at `<workspace>/<dir_name>`.
    pub fn path_for_clone(workspace: &Path, dir_name: &str) -> PathBuf {
        workspace.join(format!(".{dir_name}.lock"))
    }

    /// Lock file used for a local repository identified by `key`.
    pub fn path_for_local(workspace: &Path, key: &str) -> PathBuf {
        workspace.join(format!(".local-{key}.lock"))
    }

    /// Acquire the lock at `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked(path))
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
