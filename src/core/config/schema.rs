//! core::config::schema
//!
//! Configuration document types.
//!
//! These mirror the on-disk migration document one-to-one. They are plain
//! serde records with explicit optionality; semantic validation and the
//! conversion into typed, read-only inputs happen in
//! [`crate::core::migration`].
//!
//! # Example
//!
//! ```json
//! {
//!   "mode": "prod",
//!   "targetRepos": [
//!     {
//!       "name": "payments",
//!       "type": "remote",
//!       "source": "https://github.com/acme/payments.git",
//!       "scmProvider": { "type": "github", "domain": "github.com", "ownerOrOrg": "acme" }
//!     }
//!   ],
//!   "targetBranch": { "name": "feat/code-migration", "from": "main" },
//!   "commitMessage": { "title": "feat: code migration", "description": ["Automated."] },
//!   "pullRequest": {
//!     "github": { "title": "Feat: Code Migration", "body": ["Automated."], "base": "main" }
//!   },
//!   "replacements": { "old-org": "new-org" },
//!   "filesToExclude": ["payments/CHANGELOG.md"]
//! }
//! ```

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ConfigError;

/// Default commit title when `commitMessage.title` is absent.
pub const DEFAULT_COMMIT_TITLE: &str = "feat: code migration";

/// Root of the migration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MigrationConfig {
    /// `dev` or `prod` (case-insensitive); defaults to `prod`
    #[serde(default)]
    pub mode: Option<String>,

    /// Repositories to migrate, in reconciliation order
    #[serde(default)]
    pub target_repos: Vec<TargetRepoConfig>,

    /// Branch every target converges on
    pub target_branch: TargetBranchConfig,

    #[serde(default)]
    pub commit_message: Option<CommitMessageConfig>,

    /// Per-provider pull request settings; absent means no PRs are raised
    #[serde(default)]
    pub pull_request: Option<PullRequestConfig>,

    /// Ordered pattern to replacement mapping
    #[serde(default)]
    pub replacements: ReplacementTable,

    /// `<repoName>/<relativePath>` entries (globs allowed)
    #[serde(default)]
    pub files_to_exclude: Vec<String>,

    /// Also rewrite files under hidden directories such as `.github/`
    #[serde(default)]
    pub include_hidden_dirs: bool,
}

impl MigrationConfig {
    /// Structural checks that do not need any other context.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for empty required strings and
    /// malformed exclusion entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_branch.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "targetBranch.name cannot be empty".into(),
            ));
        }

        for (pattern, _) in self.replacements.iter() {
            if pattern.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "replacement patterns cannot be empty".into(),
                ));
            }
        }

        for entry in &self.files_to_exclude {
            if !entry.contains('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "filesToExclude entry '{}' must look like '<repoName>/<relativePath>'",
                    entry
                )));
            }
        }

        if let Some(commit) = &self.commit_message {
            if matches!(&commit.title, Some(t) if t.trim().is_empty()) {
                return Err(ConfigError::InvalidValue(
                    "commitMessage.title cannot be blank".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Where a target's repository comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKindConfig {
    /// An existing working tree on disk, migrated in place
    Local,
    /// A clone URL
    Remote,
}

/// One `targetRepos[]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetRepoConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: SourceKindConfig,

    pub source: String,

    #[serde(default)]
    pub scm_provider: Option<ScmProviderConfig>,
}

/// Hosting provider of a target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum ScmProviderConfig {
    #[serde(rename = "azuredevops", rename_all = "camelCase")]
    AzureDevOps {
        /// Organization URL, e.g. `https://dev.azure.com/acme`
        #[serde(alias = "base_url")]
        base_url: String,
        project: String,
    },

    #[serde(rename = "github", rename_all = "camelCase")]
    GitHub {
        /// `github.com` or a GitHub Enterprise host
        #[serde(default = "default_github_domain")]
        domain: String,
        #[serde(alias = "owner_or_org")]
        owner_or_org: String,
    },
}

fn default_github_domain() -> String {
    "github.com".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetBranchConfig {
    pub name: String,

    /// Base ref used when the branch has to be created
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommitMessageConfig {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<TextLines>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PullRequestConfig {
    #[serde(default)]
    pub azuredevops: Option<AzureDevOpsPrConfig>,

    #[serde(default)]
    pub github: Option<GitHubPrConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AzureDevOpsPrConfig {
    pub title: String,

    #[serde(default)]
    pub description: Option<TextLines>,

    /// Defaults to the repository's default branch
    #[serde(default)]
    pub target_ref_name: Option<String>,

    #[serde(default)]
    pub labels: Vec<LabelConfig>,

    #[serde(default)]
    pub work_item_refs: Vec<WorkItemRefConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkItemRefConfig {
    pub id: WorkItemId,
}

/// Work item ids show up both as numbers and as strings in the wild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WorkItemId {
    Number(u64),
    Text(String),
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemId::Number(n) => write!(f, "{}", n),
            WorkItemId::Text(s) => write!(f, "{}", s.trim()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GitHubPrConfig {
    pub title: String,

    #[serde(default)]
    pub body: Option<TextLines>,

    /// Defaults to the repository's default branch
    #[serde(default)]
    pub base: Option<String>,

    #[serde(default, alias = "maintainerCanModify")]
    pub maintainer_can_modify: Option<bool>,
}

/// Multi-line text written either as one string or as a list of lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TextLines {
    Single(String),
    Lines(Vec<String>),
}

impl TextLines {
    /// Join into a single `\n`-separated string.
    pub fn joined(&self) -> String {
        match self {
            TextLines::Single(s) => s.clone(),
            TextLines::Lines(lines) => lines.join("\n"),
        }
    }
}

/// Pattern to replacement pairs in document order.
///
/// A plain map type would lose declaration order, which matters because
/// later rules see the output of earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacementTable(Vec<(String, String)>);

impl ReplacementTable {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, r)| (p.as_str(), r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ReplacementTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (pattern, replacement) in &self.0 {
            map.serialize_entry(pattern, replacement)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ReplacementTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedPairs;

        impl<'de> Visitor<'de> for OrderedPairs {
            type Value = ReplacementTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of pattern to replacement strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs: Vec<(String, String)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((pattern, replacement)) = access.next_entry::<String, String>()? {
                    if pairs.iter().any(|(p, _)| *p == pattern) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate replacement pattern '{}'",
                            pattern
                        )));
                    }
                    pairs.push((pattern, replacement));
                }
                Ok(ReplacementTable(pairs))
            }
        }

        deserializer.deserialize_map(OrderedPairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"{
            "targetRepos": [
                {"name": "svc", "type": "local", "source": "/tmp/svc"}
            ],
            "targetBranch": {"name": "feat/code-migration"},
            "replacements": {"b": "2", "a": "1", "c": "3"}
        }"#
    }

    #[test]
    fn replacements_keep_document_order() {
        let config: MigrationConfig = serde_json::from_str(minimal()).unwrap();
        let patterns: Vec<&str> = config.replacements.iter().map(|(p, _)| p).collect();
        assert_eq!(patterns, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_patterns_rejected() {
        let json = r#"{"targetBranch": {"name": "x"}, "replacements": {"a": "1", "a": "2"}}"#;
        let result: Result<MigrationConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        let json = r#"{"targetBranch": {"name": "x"}, "unexpected": true}"#;
        let result: Result<MigrationConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn provider_variants_parse() {
        let json = r#"{
            "targetBranch": {"name": "x"},
            "targetRepos": [
                {"name": "a", "type": "remote", "source": "https://dev.azure.com/acme/proj/_git/a",
                 "scmProvider": {"type": "azuredevops", "baseUrl": "https://dev.azure.com/acme", "project": "proj"}},
                {"name": "b", "type": "remote", "source": "git@github.com:acme/b.git",
                 "scmProvider": {"type": "github", "ownerOrOrg": "acme"}}
            ]
        }"#;
        let config: MigrationConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(
            &config.target_repos[0].scm_provider,
            Some(ScmProviderConfig::AzureDevOps { project, .. }) if project == "proj"
        ));
        assert!(matches!(
            &config.target_repos[1].scm_provider,
            Some(ScmProviderConfig::GitHub { domain, owner_or_org }) if domain == "github.com" && owner_or_org == "acme"
        ));
    }

    #[test]
    fn pull_request_sections_parse() {
        let json = r#"{
            "targetBranch": {"name": "x"},
            "pullRequest": {
                "azuredevops": {"title": "T", "description": ["one", "two"], "targetRefName": "refs/heads/main",
                                "labels": [{"name": "migration"}], "workItemRefs": [{"id": 42}, {"id": "7"}]},
                "github": {"title": "T", "body": "single", "maintainer_can_modify": false}
            }
        }"#;
        let config: MigrationConfig = serde_json::from_str(json).unwrap();
        let pr = config.pull_request.unwrap();
        let ado = pr.azuredevops.unwrap();
        assert_eq!(ado.description.unwrap().joined(), "one\ntwo");
        assert_eq!(ado.work_item_refs[0].id.to_string(), "42");
        assert_eq!(ado.work_item_refs[1].id.to_string(), "7");
        let gh = pr.github.unwrap();
        assert_eq!(gh.body.unwrap().joined(), "single");
        assert_eq!(gh.maintainer_can_modify, Some(false));
    }

    #[test]
    fn toml_documents_parse_too() {
        let doc = r#"
            mode = "dev"
            [targetBranch]
            name = "feat/x"
            [replacements]
            "z" = "1"
            "y" = "2"
        "#;
        let config: MigrationConfig = toml::from_str(doc).unwrap();
        assert_eq!(config.mode.as_deref(), Some("dev"));
        assert_eq!(config.replacements.len(), 2);
    }

    #[test]
    fn validate_rejects_bad_exclusion_entry() {
        let mut config: MigrationConfig = serde_json::from_str(minimal()).unwrap();
        config.files_to_exclude = vec!["no-slash".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn validate_accepts_minimal() {
        let config: MigrationConfig = serde_json::from_str(minimal()).unwrap();
        assert!(config.validate().is_ok());
    }
}
