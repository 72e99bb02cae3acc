//! git
//!
//! Single interface for Git.
//!
//! # Architecture
//!
//! - [`interface`]: local reads and writes through `git2` (refs, status,
//!   index, commits, checkout, tree contents)
//! - [`remote`]: network operations through the system `git` CLI (clone,
//!   fetch, ls-remote, push), each with a deadline
//!
//! No other module imports `git2` or spawns `git`.
//!
//! # Example
//!
//! ```ignore
//! use converge::git::{Git, GitCli};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let cli = GitCli::new(Duration::from_secs(180));
//! cli.clone("https://github.com/acme/svc.git", Path::new("ws/svc")).await?;
//!
//! let git = Git::open(Path::new("ws/svc"))?;
//! let head = git.head_oid()?;
//! ```

mod interface;
pub mod remote;

pub use interface::{same_remote_url, Actor, CommitInfo, Git, GitError, WorktreeStatus};
pub use remote::{GitCli, PushMode, RemoteError, ORIGIN};
