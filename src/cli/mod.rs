//! cli
//!
//! Command-line interface layer for converge.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`]. It is the only layer that uses `anyhow`; everything
//! below it returns typed errors.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::Result;

use crate::engine::ExitStatus;
use crate::telemetry;
use crate::ui::output::Verbosity;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitStatus> {
    let cli = Cli::parse_args();

    telemetry::init_tracing(
        cli.log_json,
        telemetry::level_from_flags(cli.debug, cli.quiet),
    );
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    commands::dispatch(&cli.command, verbosity)
}
