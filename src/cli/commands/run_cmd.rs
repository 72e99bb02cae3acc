//! run command - reconcile every target
//!
//! # Examples
//!
//! ```bash
//! # Preview only
//! converge run --mode dev
//!
//! # Full run from a TOML document
//! converge run --config migration.toml --jobs 8
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};

use super::load_config;
use crate::cli::args::RunArgs;
use crate::core::credentials::Credentials;
use crate::core::migration::MigrationPlan;
use crate::engine::{self, Cancellation, Context, ExitStatus, RetryPolicy};
use crate::forge::http::DEFAULT_USER_AGENT;
use crate::forge::{HttpSettings, ProviderForgeFactory};
use crate::git::Actor;
use crate::ui::output::{self, Verbosity};

/// Run the run command.
///
/// This is a synchronous wrapper that uses tokio to run the async implementation.
pub fn run(args: &RunArgs, verbosity: Verbosity) -> Result<ExitStatus> {
    let config = load_config(&args.config.config, verbosity)?;
    let plan = MigrationPlan::from_config(&config, args.mode.map(Into::into))
        .with_context(|| format!("invalid configuration in {}", args.config.config.display()))?;

    let timeout = Duration::from_secs(args.timeout_secs);
    let ctx = Context {
        workspace: args.workspace.clone(),
        actor: Actor {
            name: args.actor_name.clone(),
            email: args.actor_email.clone(),
        },
        timeout,
        retry: RetryPolicy::default(),
        jobs: usize::from(args.jobs),
    };
    let settings = HttpSettings {
        user_agent: args
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        timeout,
    };
    let forges = Arc::new(ProviderForgeFactory::new(Credentials::from_env(), settings));

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let report = rt.block_on(async {
        let cancel = Cancellation::new();
        let listener = cancel.cancel_on_ctrl_c();
        let report = engine::run(&plan, &ctx, forges, &cancel).await;
        listener.abort();
        report
    });

    output::print_report(&report, verbosity, args.json).context("failed to render report")?;
    Ok(report.exit_status())
}
