//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--log-json`: Emit logs as JSON lines on stderr
//!
//! Every run setting also reads a `CONVERGE_*` environment variable; the
//! flag wins when both are given.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::migration::RunMode;
use crate::engine::{DEFAULT_ACTOR_EMAIL, DEFAULT_ACTOR_NAME};

/// converge - idempotent pattern-based code migration across repositories
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output: failures and totals only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile every target toward the configured migration
    #[command(
        long_about = "Reconcile every target toward the configured migration.\n\n\
            Each target repository is acquired, inspected, and brought to the \
            desired state: the migration branch exists with the replacements \
            committed, is pushed to origin, and has one open pull request. \
            Work that is already done is detected and skipped, so running \
            again after a partial failure only finishes what is missing.\n\n\
            In dev mode nothing is mutated; the run reports what prod would change.",
        after_help = "\
EXIT CODES:
    0   every target done, no warnings
    1   at least one target failed
    2   configuration error
    3   done, but warnings need attention (e.g. a refused push)

EXAMPLES:
    # Preview against every target
    converge run --mode dev

    # Full run with eight workers, machine-readable report
    converge run --config migration.toml --jobs 8 --json"
    )]
    Run(RunArgs),

    /// Load and validate the configuration without touching any repository
    Validate {
        #[command(flatten)]
        config: ConfigArg,
    },
}

/// Location of the migration document.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Migration document (.json or .toml)
    #[arg(long, env = "CONVERGE_CONFIG", default_value = "config.json")]
    pub config: PathBuf,
}

/// Settings for `converge run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Override the document's mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Directory remote targets are cloned into
    #[arg(long, env = "CONVERGE_WORKSPACE", default_value = "remote-targets")]
    pub workspace: PathBuf,

    /// Targets reconciled concurrently
    #[arg(long, env = "CONVERGE_JOBS", default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: u16,

    /// Deadline in seconds for each network call
    #[arg(long, env = "CONVERGE_TIMEOUT_SECS", default_value_t = 180, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Commit author name
    #[arg(long, env = "CONVERGE_ACTOR_NAME", default_value = DEFAULT_ACTOR_NAME, hide = true)]
    pub actor_name: String,

    /// Commit author email
    #[arg(long, env = "CONVERGE_ACTOR_EMAIL", default_value = DEFAULT_ACTOR_EMAIL, hide = true)]
    pub actor_email: String,

    /// User-Agent for provider API calls
    #[arg(long, env = "CONVERGE_USER_AGENT", hide = true)]
    pub user_agent: Option<String>,
}

/// Run mode as accepted on the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Acquire and inspect only
    Dev,
    /// Full reconciliation
    Prod,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Dev => RunMode::Dev,
            ModeArg::Prod => RunMode::Prod,
        }
    }
}
