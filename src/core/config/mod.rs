//! core::config
//!
//! Migration document loading.
//!
//! # Formats
//!
//! The document is JSON unless the file ends in `.toml`. Both go through the
//! same [`MigrationConfig`] schema, so key names and validation are shared.
//!
//! # Warnings
//!
//! Loading never fails for suspicious-but-legal documents; those produce
//! [`ConfigWarning`]s that the CLI prints before the run starts (for example
//! a `pullRequest.github` section when no target uses GitHub).
//!
//! # Example
//!
//! ```no_run
//! use converge::core::config::MigrationConfig;
//! use std::path::Path;
//!
//! let loaded = MigrationConfig::load(Path::new("config.json")).unwrap();
//! for warning in &loaded.warnings {
//!     eprintln!("warning: {}", warning.message);
//! }
//! println!("{} targets", loaded.config.target_repos.len());
//! ```

pub mod schema;

pub use schema::{
    AzureDevOpsPrConfig, CommitMessageConfig, GitHubPrConfig, LabelConfig, MigrationConfig,
    PullRequestConfig, ReplacementTable, ScmProviderConfig, SourceKindConfig, TargetBranchConfig,
    TargetRepoConfig, TextLines, WorkItemId, WorkItemRefConfig, DEFAULT_COMMIT_TITLE,
};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("invalid replacement rules: {0}")]
    Replacement(#[from] crate::replace::ReplacementError),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The file that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded document.
    pub config: MigrationConfig,
    /// Where it was loaded from.
    pub path: PathBuf,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

impl MigrationConfig {
    /// Load and structurally validate a migration document.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ReadError`] if the file cannot be read
    /// - [`ConfigError::ParseError`] if it is not a valid document
    /// - [`ConfigError::InvalidValue`] if a structural check fails
    pub fn load(path: &Path) -> Result<ConfigLoadResult, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::parse(path, &content)?;
        config.validate()?;

        let warnings = config
            .lint()
            .into_iter()
            .map(|message| ConfigWarning {
                message,
                path: path.to_path_buf(),
            })
            .collect();

        Ok(ConfigLoadResult {
            config,
            path: path.to_path_buf(),
            warnings,
        })
    }

    /// Parse document text, picking the format from the file extension.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            toml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::ParseError {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Collect non-fatal observations about the document.
    fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.target_repos.is_empty() {
            warnings.push("no targetRepos configured; nothing to do".to_string());
        }
        if self.replacements.is_empty() {
            warnings.push(
                "no replacements configured; targets can only be checked for pending commits"
                    .to_string(),
            );
        }

        if let Some(pr) = &self.pull_request {
            let uses = |wanted: fn(&ScmProviderConfig) -> bool| {
                self.target_repos
                    .iter()
                    .any(|t| t.scm_provider.as_ref().is_some_and(wanted))
            };
            if pr.azuredevops.is_some()
                && !uses(|p| matches!(p, ScmProviderConfig::AzureDevOps { .. }))
            {
                warnings.push(
                    "pullRequest.azuredevops is set but no target uses Azure DevOps".to_string(),
                );
            }
            if pr.github.is_some() && !uses(|p| matches!(p, ScmProviderConfig::GitHub { .. })) {
                warnings.push("pullRequest.github is set but no target uses GitHub".to_string());
            }
        }

        let names: Vec<&str> = self.target_repos.iter().map(|t| t.name.as_str()).collect();
        for entry in &self.files_to_exclude {
            let repo = entry.split('/').next().unwrap_or_default();
            if !names.iter().any(|n| glob::Pattern::new(repo).map_or(*n == repo, |p| p.matches(n)))
            {
                warnings.push(format!(
                    "filesToExclude entry '{}' does not name a configured target",
                    entry
                ));
            }
        }

        warnings
    }
}
