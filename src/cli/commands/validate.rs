//! validate command - check the migration document
//!
//! Loads the document, builds the plan, and prints what a run would do
//! with it. No repository or provider is contacted.

use anyhow::{Context as _, Result};

use super::load_config;
use crate::cli::args::ConfigArg;
use crate::core::migration::{MigrationPlan, TargetSetup};
use crate::engine::ExitStatus;
use crate::ui::output::{self, Verbosity};

/// Run the validate command.
///
/// Exits with the configuration status when any target is rejected.
pub fn validate(args: &ConfigArg, verbosity: Verbosity) -> Result<ExitStatus> {
    let config = load_config(&args.config, verbosity)?;
    let plan = MigrationPlan::from_config(&config, None)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;

    output::print(describe_plan(&plan), verbosity);

    let rejected = plan.targets.len() - plan.ready_count();
    if rejected > 0 {
        output::error(format!("{} target(s) rejected", rejected));
        return Ok(ExitStatus::ConfigError);
    }
    Ok(ExitStatus::Success)
}

fn describe_plan(plan: &MigrationPlan) -> String {
    let mut lines = vec![
        format!("mode: {}", plan.mode),
        match &plan.branch.from {
            Some(from) => format!("branch: {} (from {})", plan.branch.name, from),
            None => format!("branch: {} (from the checked-out branch)", plan.branch.name),
        },
        format!("commit: {}", plan.commit.title),
        format!("replacements: {}", plan.engine.rules().len()),
        format!("targets: {} ({} ready)", plan.targets.len(), plan.ready_count()),
    ];
    for setup in &plan.targets {
        match setup {
            TargetSetup::Ready(target) => {
                let provider = target
                    .scm_provider
                    .as_ref()
                    .map(|p| p.kind().to_string())
                    .unwrap_or_else(|| "none".to_string());
                let pr = if target.pull_request.is_some() {
                    "pull request"
                } else {
                    "no pull request"
                };
                lines.push(format!(
                    "  {}  {:?}  {}  [{}, {}]",
                    target.name, target.source_kind, target.source, provider, pr
                ));
            }
            TargetSetup::Rejected { name, reason } => {
                lines.push(format!("  {}  rejected: {}", name, reason));
            }
        }
    }
    lines.join("\n")
}
