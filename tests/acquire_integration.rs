//! Integration tests for repository acquisition.
//!
//! Clones run through the real `git` CLI. Slow or flaky remotes are
//! simulated with git's `ext::` transport, which runs a shell script in
//! place of the remote and either stalls or serves a local bare repository.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;

use converge::core::migration::{MigrationTarget, SourceKind};
use converge::core::types::TargetName;
use converge::engine::acquire::{clone_dir_name, AcquireError, Acquirer};
use converge::engine::retry::RetryPolicy;
use converge::git::{GitCli, RemoteError};

// =============================================================================
// Test Fixtures
// =============================================================================

fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git command failed");
    assert!(status.success(), "git {:?} failed", args);
}

/// A seeded repository with a bare origin, plus an empty workspace.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let seed = dir.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();

        run_git(&seed, &["init", "-q"]);
        run_git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(&seed, &["config", "user.email", "test@example.com"]);
        run_git(&seed, &["config", "user.name", "Test User"]);
        std::fs::write(seed.join("README.md"), "Welcome to old-org\n").unwrap();
        run_git(&seed, &["add", "README.md"]);
        run_git(&seed, &["commit", "-q", "-m", "Initial commit"]);
        run_git(dir.path(), &["clone", "-q", "--bare", "seed", "origin.git"]);

        Self { dir }
    }

    fn seed(&self) -> PathBuf {
        self.dir.path().join("seed")
    }

    fn origin(&self) -> PathBuf {
        self.dir.path().join("origin.git")
    }

    fn workspace(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    fn acquirer(&self, timeout: Duration, attempts: u32) -> Acquirer {
        let retry = RetryPolicy {
            max_attempts: attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            multiplier: 2,
        };
        Acquirer::new(self.workspace(), GitCli::new(timeout), retry)
    }

    /// `ext::` source whose first connection stalls and whose later
    /// connections serve the bare origin.
    fn stalls_once_source(&self) -> String {
        let marker = self.dir.path().join("stalled-once");
        let script = self.dir.path().join("stalls-once.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 if [ -e \"{marker}\" ]; then exec git \"$1\" \"{origin}\"; fi\n\
                 touch \"{marker}\"\n\
                 exec sleep 30\n",
                marker = marker.display(),
                origin = self.origin().display(),
            ),
        )
        .unwrap();
        format!("ext::sh {} %s", script.display())
    }

    /// `ext::` source that never answers.
    fn stalls_forever_source(&self) -> String {
        let script = self.dir.path().join("stalls.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        format!("ext::sh {} %s", script.display())
    }

    fn stalled_once(&self) -> bool {
        self.dir.path().join("stalled-once").exists()
    }
}

fn remote_target(name: &str, source: String) -> MigrationTarget {
    MigrationTarget {
        name: TargetName::new(name).unwrap(),
        source,
        source_kind: SourceKind::Remote,
        scm_provider: None,
        pull_request: None,
    }
}

fn local_target(name: &str, path: &Path) -> MigrationTarget {
    MigrationTarget {
        name: TargetName::new(name).unwrap(),
        source: path.to_string_lossy().into_owned(),
        source_kind: SourceKind::Local,
        scm_provider: None,
        pull_request: None,
    }
}

/// Allow the `ext::` transport for git processes spawned by this binary.
fn allow_ext_transport() {
    std::env::set_var("GIT_ALLOW_PROTOCOL", "ext:file");
}

fn workspace_entries(ws: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(ws)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// =============================================================================
// Remote clones
// =============================================================================

#[tokio::test]
async fn clone_into_empty_workspace() {
    let fx = Fixture::new();
    let target = remote_target("svc", fx.origin().to_string_lossy().into_owned());

    let tree = fx
        .acquirer(Duration::from_secs(30), 1)
        .acquire(&target)
        .await
        .unwrap();

    assert!(tree.is_fresh_clone());
    assert_eq!(tree.path(), fx.workspace().join(clone_dir_name("svc")));
    assert_eq!(
        std::fs::read_to_string(tree.path().join("README.md")).unwrap(),
        "Welcome to old-org\n"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn timed_out_clone_is_retried_until_it_succeeds() {
    allow_ext_transport();
    let fx = Fixture::new();
    let target = remote_target("svc", fx.stalls_once_source());

    let tree = fx
        .acquirer(Duration::from_secs(2), 3)
        .acquire(&target)
        .await
        .unwrap();

    assert!(fx.stalled_once(), "first attempt should have stalled");
    assert!(tree.is_fresh_clone());
    assert_eq!(
        std::fs::read_to_string(tree.path().join("README.md")).unwrap(),
        "Welcome to old-org\n"
    );
    let dir = clone_dir_name("svc");
    assert!(!fx.workspace().join(format!(".{dir}.partial")).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn clone_that_never_finishes_leaves_no_partial_directory() {
    allow_ext_transport();
    let fx = Fixture::new();
    let target = remote_target("svc", fx.stalls_forever_source());

    let err = fx
        .acquirer(Duration::from_secs(1), 2)
        .acquire(&target)
        .await
        .unwrap_err();

    assert!(
        matches!(err, AcquireError::Remote(RemoteError::Timeout { .. })),
        "{err}"
    );
    assert!(err.is_transient());

    // Only the lock file remains; the clone directory was never created.
    let dir = clone_dir_name("svc");
    assert_eq!(workspace_entries(&fx.workspace()), vec![format!(".{dir}.lock")]);
}

#[tokio::test]
async fn leftover_partial_clone_is_discarded() {
    let fx = Fixture::new();
    let dir = clone_dir_name("svc");
    let partial = fx.workspace().join(format!(".{dir}.partial"));
    std::fs::create_dir_all(partial.join(".git")).unwrap();
    std::fs::write(partial.join(".git").join("HEAD"), "garbage").unwrap();

    let target = remote_target("svc", fx.origin().to_string_lossy().into_owned());
    let tree = fx
        .acquirer(Duration::from_secs(30), 1)
        .acquire(&target)
        .await
        .unwrap();

    assert!(tree.path().join("README.md").exists());
    assert!(!partial.exists());
}

// =============================================================================
// Local targets
// =============================================================================

#[tokio::test]
async fn local_target_lock_stays_out_of_the_repository() {
    let fx = Fixture::new();
    let acquirer = fx.acquirer(Duration::from_secs(30), 1);
    let target = local_target("seed", &fx.seed());

    let tree = acquirer.acquire(&target).await.unwrap();
    assert_eq!(tree.path(), fx.seed());
    assert!(!tree.is_fresh_clone());
    assert!(!fx.seed().join(".git").join("converge.lock").exists());

    let again = acquirer.acquire(&target).await.unwrap_err();
    assert!(matches!(again, AcquireError::Locked(_)), "{again}");

    drop(tree);
    assert!(acquirer.acquire(&target).await.is_ok());
}
