//! core::migration
//!
//! Validated, read-only inputs of a run.
//!
//! [`MigrationPlan::from_config`] turns a parsed [`MigrationConfig`] into the
//! typed records the engine works with. Problems that concern the whole
//! document (bad branch name, duplicate target names, malformed replacement
//! rules) fail the conversion. Problems that concern a single target
//! (provider mismatch, missing PR title for its provider) only reject that
//! target, which is reported as a configuration failure while the others
//! proceed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::config::{
    AzureDevOpsPrConfig, ConfigError, GitHubPrConfig, MigrationConfig, ScmProviderConfig,
    SourceKindConfig, TargetRepoConfig, DEFAULT_COMMIT_TITLE,
};
use super::types::{BranchName, TargetName};
use crate::replace::{ExclusionSet, ReplacementEngine, ReplacementSet};

/// Global run switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Acquire and inspect only; nothing is mutated.
    Dev,
    /// Full reconciliation.
    #[default]
    Prod,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(RunMode::Dev),
            "prod" => Ok(RunMode::Prod),
            other => Err(format!(
                "invalid mode '{}', must be 'dev' or 'prod'",
                other
            )),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Dev => write!(f, "dev"),
            RunMode::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Remote,
}

/// Which provider family a target lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProviderKind {
    #[serde(rename = "azuredevops")]
    AzureDevOps,
    #[serde(rename = "github")]
    GitHub,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::AzureDevOps => write!(f, "azuredevops"),
            ProviderKind::GitHub => write!(f, "github"),
        }
    }
}

/// Provider coordinates of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmProvider {
    AzureDevOps { base_url: String, project: String },
    GitHub { domain: String, owner_or_org: String },
}

impl ScmProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ScmProvider::AzureDevOps { .. } => ProviderKind::AzureDevOps,
            ScmProvider::GitHub { .. } => ProviderKind::GitHub,
        }
    }
}

/// One repository to migrate.
#[derive(Debug, Clone)]
pub struct MigrationTarget {
    pub name: TargetName,
    pub source: String,
    pub source_kind: SourceKind,
    pub scm_provider: Option<ScmProvider>,
    /// PR to ensure for this target, resolved from its provider
    pub pull_request: Option<PullRequestSpec>,
}

/// Branch every target converges on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredBranch {
    pub name: BranchName,
    /// Base for creation; the checked-out branch when absent
    pub from: Option<BranchName>,
}

/// The single commit authored per target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSpec {
    pub title: String,
    pub description: Option<String>,
}

impl CommitSpec {
    /// Full commit message: title, blank line, body.
    pub fn message(&self) -> String {
        match &self.description {
            Some(body) if !body.trim().is_empty() => format!("{}\n\n{}\n", self.title, body),
            _ => format!("{}\n", self.title),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureDevOpsPrSpec {
    pub title: String,
    pub description: Option<String>,
    pub target_ref_name: Option<BranchName>,
    pub labels: Vec<String>,
    pub work_item_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubPrSpec {
    pub title: String,
    pub body: Option<String>,
    pub base: Option<BranchName>,
    pub maintainer_can_modify: Option<bool>,
}

/// Desired pull request, per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestSpec {
    AzureDevOps(AzureDevOpsPrSpec),
    GitHub(GitHubPrSpec),
}

impl PullRequestSpec {
    pub fn title(&self) -> &str {
        match self {
            PullRequestSpec::AzureDevOps(spec) => &spec.title,
            PullRequestSpec::GitHub(spec) => &spec.title,
        }
    }

    /// Description (Azure DevOps) or body (GitHub).
    pub fn body(&self) -> Option<&str> {
        match self {
            PullRequestSpec::AzureDevOps(spec) => spec.description.as_deref(),
            PullRequestSpec::GitHub(spec) => spec.body.as_deref(),
        }
    }

    /// Explicit target branch; `None` means the provider's default branch.
    pub fn target_branch(&self) -> Option<&BranchName> {
        match self {
            PullRequestSpec::AzureDevOps(spec) => spec.target_ref_name.as_ref(),
            PullRequestSpec::GitHub(spec) => spec.base.as_ref(),
        }
    }
}

/// A target after setup validation.
#[derive(Debug, Clone)]
pub enum TargetSetup {
    Ready(MigrationTarget),
    /// Rejected before the run; never started.
    Rejected { name: String, reason: String },
}

impl TargetSetup {
    pub fn name(&self) -> &str {
        match self {
            TargetSetup::Ready(target) => target.name.as_str(),
            TargetSetup::Rejected { name, .. } => name,
        }
    }
}

/// Everything a run needs, validated once.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub mode: RunMode,
    pub targets: Vec<TargetSetup>,
    pub branch: DesiredBranch,
    pub commit: CommitSpec,
    pub engine: Arc<ReplacementEngine>,
}

impl MigrationPlan {
    /// Validate a document into a plan.
    ///
    /// `mode_override` (from the command line) wins over the document's `mode`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for document-level problems.
    pub fn from_config(
        config: &MigrationConfig,
        mode_override: Option<RunMode>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mode = match (mode_override, &config.mode) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => raw.parse().map_err(ConfigError::InvalidValue)?,
            (None, None) => RunMode::default(),
        };

        let branch = DesiredBranch {
            name: BranchName::new(config.target_branch.name.trim()).map_err(|e| {
                ConfigError::InvalidValue(format!("targetBranch.name: {}", e))
            })?,
            from: config
                .target_branch
                .from
                .as_deref()
                .map(|from| {
                    BranchName::new(from.trim())
                        .map_err(|e| ConfigError::InvalidValue(format!("targetBranch.from: {}", e)))
                })
                .transpose()?,
        };

        let commit = match &config.commit_message {
            Some(c) => CommitSpec {
                title: c
                    .title
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or(DEFAULT_COMMIT_TITLE)
                    .to_string(),
                description: c.description.as_ref().map(|d| d.joined()),
            },
            None => CommitSpec {
                title: DEFAULT_COMMIT_TITLE.to_string(),
                description: None,
            },
        };

        let mut seen = HashSet::new();
        for repo in &config.target_repos {
            if !seen.insert(repo.name.trim()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate target name '{}'; each target must be unique within a run",
                    repo.name
                )));
            }
        }

        let replacements = ReplacementSet::compile(config.replacements.iter())?;
        let exclusions = ExclusionSet::new(config.files_to_exclude.iter().map(String::as_str));
        let engine = Arc::new(ReplacementEngine::new(
            replacements,
            exclusions,
            config.include_hidden_dirs,
        ));

        let pr = config.pull_request.as_ref();
        let azure_pr = pr.and_then(|p| p.azuredevops.as_ref());
        let github_pr = pr.and_then(|p| p.github.as_ref());

        let targets = config
            .target_repos
            .iter()
            .map(|repo| match build_target(repo, azure_pr, github_pr) {
                Ok(target) => TargetSetup::Ready(target),
                Err(reason) => TargetSetup::Rejected {
                    name: repo.name.clone(),
                    reason,
                },
            })
            .collect();

        Ok(Self {
            mode,
            targets,
            branch,
            commit,
            engine,
        })
    }

    /// Count of targets that passed setup validation.
    pub fn ready_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t, TargetSetup::Ready(_)))
            .count()
    }
}

fn build_target(
    repo: &TargetRepoConfig,
    azure_pr: Option<&AzureDevOpsPrConfig>,
    github_pr: Option<&GitHubPrConfig>,
) -> Result<MigrationTarget, String> {
    let name = TargetName::new(repo.name.clone()).map_err(|e| e.to_string())?;

    let source = repo.source.trim().to_string();
    if source.is_empty() {
        return Err("source cannot be empty".to_string());
    }

    let source_kind = match repo.kind {
        SourceKindConfig::Local => SourceKind::Local,
        SourceKindConfig::Remote => SourceKind::Remote,
    };

    let scm_provider = repo.scm_provider.as_ref().map(|p| match p {
        ScmProviderConfig::AzureDevOps { base_url, project } => ScmProvider::AzureDevOps {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            project: project.trim().to_string(),
        },
        ScmProviderConfig::GitHub {
            domain,
            owner_or_org,
        } => ScmProvider::GitHub {
            domain: domain.trim().to_ascii_lowercase(),
            owner_or_org: owner_or_org.trim().to_string(),
        },
    });

    if let Some(provider) = &scm_provider {
        check_provider_fields(provider)?;
        if source_kind == SourceKind::Remote {
            check_provider_matches_source(provider, &source)?;
        }
    }

    let pull_request = match &scm_provider {
        Some(ScmProvider::AzureDevOps { .. }) => azure_pr.map(azure_spec).transpose()?,
        Some(ScmProvider::GitHub { .. }) => github_pr.map(github_spec).transpose()?,
        None => None,
    };

    Ok(MigrationTarget {
        name,
        source,
        source_kind,
        scm_provider,
        pull_request,
    })
}

fn check_provider_fields(provider: &ScmProvider) -> Result<(), String> {
    match provider {
        ScmProvider::AzureDevOps { base_url, project } => {
            if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                return Err(format!(
                    "scmProvider.baseUrl '{}' must be an http(s) URL",
                    base_url
                ));
            }
            if project.is_empty() {
                return Err("scmProvider.project cannot be empty".to_string());
            }
        }
        ScmProvider::GitHub {
            domain,
            owner_or_org,
        } => {
            if domain.is_empty() || domain.contains('/') {
                return Err(format!("scmProvider.domain '{}' must be a bare host", domain));
            }
            if owner_or_org.is_empty() {
                return Err("scmProvider.ownerOrOrg cannot be empty".to_string());
            }
        }
    }
    Ok(())
}

/// Host part of a clone URL (`https://`, `ssh://` or scp-like `user@host:path`).
pub fn source_host(source: &str) -> Option<String> {
    let rest = if let Some((_, rest)) = source.split_once("://") {
        rest
    } else if source.contains('@') && source.contains(':') {
        source
    } else {
        return None;
    };

    let authority = rest.split('/').next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Provider implied by a clone URL, when the host is a recognizable one.
pub fn implied_provider(source: &str, github_domain: Option<&str>) -> Option<ProviderKind> {
    let host = source_host(source)?;
    if host == "dev.azure.com" || host == "ssh.dev.azure.com" || host.ends_with(".visualstudio.com")
    {
        return Some(ProviderKind::AzureDevOps);
    }
    if host == "github.com" || github_domain.is_some_and(|d| d == host) {
        return Some(ProviderKind::GitHub);
    }
    None
}

fn check_provider_matches_source(provider: &ScmProvider, source: &str) -> Result<(), String> {
    let github_domain = match provider {
        ScmProvider::GitHub { domain, .. } => Some(domain.as_str()),
        ScmProvider::AzureDevOps { .. } => None,
    };

    if let Some(implied) = implied_provider(source, github_domain) {
        if implied != provider.kind() {
            return Err(format!(
                "scmProvider.type is '{}' but source '{}' points at {}",
                provider.kind(),
                source,
                implied
            ));
        }
    }

    if let (ScmProvider::GitHub { domain, .. }, Some(host)) = (provider, source_host(source)) {
        if host == "github.com" && domain != "github.com" {
            return Err(format!(
                "scmProvider.domain is '{}' but source '{}' is on github.com",
                domain, source
            ));
        }
    }

    Ok(())
}

fn optional_branch(value: Option<&String>, field: &str) -> Result<Option<BranchName>, String> {
    value
        .map(|raw| BranchName::new(raw.trim()).map_err(|e| format!("{}: {}", field, e)))
        .transpose()
}

fn azure_spec(cfg: &AzureDevOpsPrConfig) -> Result<PullRequestSpec, String> {
    if cfg.title.trim().is_empty() {
        return Err("pullRequest.azuredevops.title is required".to_string());
    }
    Ok(PullRequestSpec::AzureDevOps(AzureDevOpsPrSpec {
        title: cfg.title.trim().to_string(),
        description: cfg.description.as_ref().map(|d| d.joined()),
        target_ref_name: optional_branch(
            cfg.target_ref_name.as_ref(),
            "pullRequest.azuredevops.targetRefName",
        )?,
        labels: dedup(cfg.labels.iter().map(|l| l.name.trim().to_string())),
        work_item_refs: dedup(cfg.work_item_refs.iter().map(|w| w.id.to_string())),
    }))
}

fn github_spec(cfg: &GitHubPrConfig) -> Result<PullRequestSpec, String> {
    if cfg.title.trim().is_empty() {
        return Err("pullRequest.github.title is required".to_string());
    }
    Ok(PullRequestSpec::GitHub(GitHubPrSpec {
        title: cfg.title.trim().to_string(),
        body: cfg.body.as_ref().map(|b| b.joined()),
        base: optional_branch(cfg.base.as_ref(), "pullRequest.github.base")?,
        maintainer_can_modify: cfg.maintainer_can_modify,
    }))
}

/// Labels and work items are sets; keep first occurrence order.
fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> MigrationConfig {
        serde_json::from_str(json).unwrap()
    }

    const BASE: &str = r#"{
        "targetRepos": [
            {"name": "gh-svc", "type": "remote", "source": "https://github.com/acme/gh-svc.git",
             "scmProvider": {"type": "github", "domain": "github.com", "ownerOrOrg": "acme"}},
            {"name": "ado-svc", "type": "remote", "source": "https://dev.azure.com/acme/core/_git/ado-svc",
             "scmProvider": {"type": "azuredevops", "baseUrl": "https://dev.azure.com/acme/", "project": "core"}},
            {"name": "local-svc", "type": "local", "source": "/srv/local-svc"}
        ],
        "targetBranch": {"name": "feat/code-migration", "from": "main"},
        "commitMessage": {"title": "feat: move org", "description": ["first", "second"]},
        "pullRequest": {
            "azuredevops": {"title": "Feat: Code Migration", "targetRefName": "refs/heads/main",
                            "labels": [{"name": "auto"}, {"name": "auto"}], "workItemRefs": [{"id": 12}]},
            "github": {"title": "Feat: Code Migration", "body": ["hello"], "maintainer_can_modify": true}
        },
        "replacements": {"old-org": "new-org"}
    }"#;

    #[test]
    fn builds_plan_with_defaults() {
        let plan = MigrationPlan::from_config(&config(BASE), None).unwrap();
        assert_eq!(plan.mode, RunMode::Prod);
        assert_eq!(plan.branch.name.as_str(), "feat/code-migration");
        assert_eq!(plan.branch.from.as_ref().unwrap().as_str(), "main");
        assert_eq!(plan.commit.message(), "feat: move org\n\nfirst\nsecond\n");
        assert_eq!(plan.ready_count(), 3);
    }

    #[test]
    fn resolves_pull_request_per_provider() {
        let plan = MigrationPlan::from_config(&config(BASE), None).unwrap();
        let specs: Vec<Option<PullRequestSpec>> = plan
            .targets
            .iter()
            .map(|t| match t {
                TargetSetup::Ready(target) => target.pull_request.clone(),
                TargetSetup::Rejected { .. } => panic!("unexpected rejection"),
            })
            .collect();

        match &specs[0] {
            Some(PullRequestSpec::GitHub(gh)) => {
                assert_eq!(gh.body.as_deref(), Some("hello"));
                assert!(gh.base.is_none());
            }
            other => panic!("expected github spec, got {other:?}"),
        }
        match &specs[1] {
            Some(PullRequestSpec::AzureDevOps(ado)) => {
                assert_eq!(ado.target_ref_name.as_ref().unwrap().as_str(), "main");
                assert_eq!(ado.labels, vec!["auto".to_string()]);
                assert_eq!(ado.work_item_refs, vec!["12".to_string()]);
            }
            other => panic!("expected azure spec, got {other:?}"),
        }
        assert!(specs[2].is_none());
    }

    #[test]
    fn mode_override_wins() {
        let mut cfg = config(BASE);
        cfg.mode = Some("prod".into());
        let plan = MigrationPlan::from_config(&cfg, Some(RunMode::Dev)).unwrap();
        assert_eq!(plan.mode, RunMode::Dev);
    }

    #[test]
    fn invalid_mode_is_document_error() {
        let mut cfg = config(BASE);
        cfg.mode = Some("staging".into());
        assert!(matches!(
            MigrationPlan::from_config(&cfg, None),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn mode_is_case_insensitive() {
        assert_eq!(" DEV ".parse::<RunMode>().unwrap(), RunMode::Dev);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut cfg = config(BASE);
        let dup = cfg.target_repos[0].clone();
        cfg.target_repos.push(dup);
        let err = MigrationPlan::from_config(&cfg, None).unwrap_err();
        assert!(err.to_string().contains("duplicate target name"));
    }

    #[test]
    fn bad_regex_is_document_error() {
        let mut cfg = config(BASE);
        cfg.replacements = crate::core::config::ReplacementTable::new(vec![(
            "(unclosed".into(),
            "x".into(),
        )]);
        assert!(matches!(
            MigrationPlan::from_config(&cfg, None),
            Err(ConfigError::Replacement(_))
        ));
    }

    #[test]
    fn provider_mismatch_rejects_only_that_target() {
        let mut cfg = config(BASE);
        cfg.target_repos[0].source = "https://dev.azure.com/acme/core/_git/gh-svc".into();
        let plan = MigrationPlan::from_config(&cfg, None).unwrap();

        match &plan.targets[0] {
            TargetSetup::Rejected { name, reason } => {
                assert_eq!(name, "gh-svc");
                assert!(reason.contains("azuredevops"), "{reason}");
            }
            TargetSetup::Ready(_) => panic!("mismatch should reject the target"),
        }
        assert_eq!(plan.ready_count(), 2);
    }

    #[test]
    fn missing_pr_title_rejects_targets_of_that_provider() {
        let mut cfg = config(BASE);
        if let Some(pr) = cfg.pull_request.as_mut() {
            if let Some(gh) = pr.github.as_mut() {
                gh.title = "  ".into();
            }
        }
        let plan = MigrationPlan::from_config(&cfg, None).unwrap();
        assert!(matches!(&plan.targets[0], TargetSetup::Rejected { reason, .. } if reason.contains("title")));
        assert!(matches!(&plan.targets[1], TargetSetup::Ready(_)));
    }

    #[test]
    fn host_parsing_handles_common_url_shapes() {
        assert_eq!(
            source_host("https://github.com/acme/x.git").as_deref(),
            Some("github.com")
        );
        assert_eq!(
            source_host("git@github.com:acme/x.git").as_deref(),
            Some("github.com")
        );
        assert_eq!(
            source_host("ssh://git@ssh.dev.azure.com:22/v3/acme/core/x").as_deref(),
            Some("ssh.dev.azure.com")
        );
        assert_eq!(
            source_host("https://user@acme.visualstudio.com/core/_git/x").as_deref(),
            Some("acme.visualstudio.com")
        );
        assert_eq!(source_host("/srv/repos/x"), None);
    }

    #[test]
    fn enterprise_domain_implies_github() {
        assert_eq!(
            implied_provider("https://ghe.acme.io/team/x.git", Some("ghe.acme.io")),
            Some(ProviderKind::GitHub)
        );
        assert_eq!(implied_provider("https://git.acme.io/team/x.git", None), None);
    }
}
