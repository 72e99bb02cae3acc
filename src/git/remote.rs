//! git::remote
//!
//! Network operations through the system `git` CLI.
//!
//! Clone, fetch, ls-remote and push shell out so that SSH keys, credential
//! helpers and `~/.gitconfig` apply exactly as they do for the operator.
//! Every call runs under a deadline; the child is killed when it expires.
//! Interactive prompts are disabled (`GIT_TERMINAL_PROMPT=0`) so a missing
//! credential fails instead of hanging.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::core::types::{BranchName, Oid};

pub const ORIGIN: &str = "origin";

/// Errors from git CLI invocations.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("git {op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },

    #[error(
        "git {op} failed: authentication failed. Make sure you have access to the repository \
         (SSH key in ssh-agent, a credential helper, or a personal access token): {stderr}"
    )]
    Auth { op: &'static str, stderr: String },

    #[error("git {op} failed: network error: {stderr}")]
    Network { op: &'static str, stderr: String },

    #[error("git {op} rejected: {stderr}")]
    Rejected { op: &'static str, stderr: String },

    #[error("git {op} failed: {stderr}")]
    Failed { op: &'static str, stderr: String },

    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),
}

impl RemoteError {
    /// Worth retrying: timeouts and network failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout { .. } | RemoteError::Network { .. })
    }
}

/// How a branch is pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
    /// First push; sets upstream (`-u`).
    SetUpstream,
    /// Fast-forward the remote branch.
    FastForward,
    /// Replace the remote tip, but only if it is still `expected`.
    ForceWithLease { expected: Oid },
}

const AUTH_MARKERS: &[&str] = &[
    "Authentication failed",
    "Permission denied",
    "Could not read from remote repository",
    "could not read Username",
    "terminal prompts disabled",
    "returned error: 401",
    "returned error: 403",
];

const NETWORK_MARKERS: &[&str] = &[
    "Could not resolve host",
    "Connection timed out",
    "Connection refused",
    "Connection reset",
    "Operation timed out",
    "early EOF",
    "remote end hung up unexpectedly",
    "returned error: 429",
    "returned error: 500",
    "returned error: 502",
    "returned error: 503",
    "returned error: 504",
    "TLS",
];

const REJECT_MARKERS: &[&str] = &["[rejected]", "stale info", "non-fast-forward", "! [remote rejected]"];

fn classify(op: &'static str, stderr: String) -> RemoteError {
    let has = |markers: &[&str]| markers.iter().any(|m| stderr.contains(m));
    if has(REJECT_MARKERS) {
        RemoteError::Rejected { op, stderr }
    } else if has(AUTH_MARKERS) {
        RemoteError::Auth { op, stderr }
    } else if has(NETWORK_MARKERS) {
        RemoteError::Network { op, stderr }
    } else {
        RemoteError::Failed { op, stderr }
    }
}

/// Runner for git CLI network commands.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(
        &self,
        op: &'static str,
        dir: Option<&Path>,
        args: &[&str],
    ) -> Result<String, RemoteError> {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(op, ?args, "running git");
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(RemoteError::Spawn)?,
            Err(_) => {
                return Err(RemoteError::Timeout {
                    op,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(classify(op, stderr))
        }
    }

    /// `git clone <url> <dest>`.
    pub async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), RemoteError> {
        let dest = dest.to_string_lossy();
        self.run("clone", None, &["clone", "--quiet", url, &*dest])
            .await
            .map(|_| ())
    }

    /// `git fetch --prune origin`.
    pub async fn fetch(&self, repo: &Path) -> Result<(), RemoteError> {
        self.run("fetch", Some(repo), &["fetch", "--quiet", "--prune", ORIGIN])
            .await
            .map(|_| ())
    }

    /// Fetch one branch into its remote-tracking ref.
    pub async fn fetch_branch(&self, repo: &Path, branch: &BranchName) -> Result<(), RemoteError> {
        let refspec = format!("+{}:{}", branch.local_ref(), branch.remote_ref(ORIGIN));
        self.run("fetch", Some(repo), &["fetch", "--quiet", ORIGIN, &refspec])
            .await
            .map(|_| ())
    }

    /// Tip of `branch` on origin, or `None` if it does not exist there.
    pub async fn ls_remote_branch(
        &self,
        repo: &Path,
        branch: &BranchName,
    ) -> Result<Option<Oid>, RemoteError> {
        let refname = branch.local_ref();
        let stdout = self
            .run(
                "ls-remote",
                Some(repo),
                &["ls-remote", "--heads", ORIGIN, &refname],
            )
            .await?;
        Ok(parse_ls_remote(&stdout, &refname))
    }

    /// Push `branch` to origin.
    pub async fn push(
        &self,
        repo: &Path,
        branch: &BranchName,
        mode: &PushMode,
    ) -> Result<(), RemoteError> {
        let refspec = format!("{}:{}", branch.local_ref(), branch.local_ref());
        let lease;
        let mut args = vec!["push"];
        match mode {
            PushMode::SetUpstream => args.push("-u"),
            PushMode::FastForward => {}
            PushMode::ForceWithLease { expected } => {
                lease = format!("--force-with-lease={}:{}", branch.local_ref(), expected);
                args.push(&lease);
            }
        }
        args.push(ORIGIN);
        args.push(&refspec);
        self.run("push", Some(repo), &args).await.map(|_| ())
    }
}

/// Find the oid advertised for `refname` in `git ls-remote` output.
fn parse_ls_remote(stdout: &str, refname: &str) -> Option<Oid> {
    stdout.lines().find_map(|line| {
        let (oid, name) = line.split_once('\t')?;
        if name.trim() == refname {
            Oid::new(oid.trim()).ok()
        } else {
            None
        }
    })
}
