//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads and validates the migration document
//! 2. Calls the engine
//! 3. Formats and displays output
//!
//! Handlers return the [`ExitStatus`] the process should end with;
//! errors that escape a handler are reported by `main`.

mod run_cmd;
mod validate;

pub use run_cmd::run;
pub use validate::validate;

use std::path::Path;

use anyhow::{Context as _, Result};

use super::args::Command;
use crate::core::config::MigrationConfig;
use crate::engine::ExitStatus;
use crate::ui::output::{self, Verbosity};

/// Dispatch a parsed command.
pub fn dispatch(command: &Command, verbosity: Verbosity) -> Result<ExitStatus> {
    match command {
        Command::Run(args) => run(args, verbosity),
        Command::Validate { config } => validate(config, verbosity),
    }
}

/// Load the document and surface its warnings.
fn load_config(path: &Path, verbosity: Verbosity) -> Result<MigrationConfig> {
    let loaded = MigrationConfig::load(path)
        .with_context(|| format!("cannot load configuration from {}", path.display()))?;
    for warning in &loaded.warnings {
        output::warn(
            format!("{}: {}", warning.path.display(), warning.message),
            verbosity,
        );
    }
    Ok(loaded.config)
}
