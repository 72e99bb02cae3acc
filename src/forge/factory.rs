//! forge::factory
//!
//! Forge selection and creation.
//!
//! # Design
//!
//! The reconciler never names a concrete adapter. It asks a
//! [`ForgeFactory`] for the forge of a target; production runs use
//! [`ProviderForgeFactory`], which picks the adapter from the target's
//! `scmProvider` and the token from [`Credentials`]. Tests pass a closure
//! returning a [`MockForge`](super::MockForge).
//!
//! # Example
//!
//! ```ignore
//! use converge::forge::{create_forge, HttpSettings};
//! use converge::core::credentials::Credentials;
//!
//! let forge = create_forge(&target, &Credentials::from_env(), &HttpSettings::default())?;
//! let default = forge.default_branch().await?;
//! ```

use std::sync::Arc;

use super::azure_devops::AzureDevOpsForge;
use super::github::{api_base_for_domain, GitHubForge};
use super::http::HttpSettings;
use super::traits::{Forge, ForgeError};
use crate::core::credentials::{Credentials, AZURE_DEVOPS_PAT};
use crate::core::migration::{MigrationTarget, ScmProvider};

/// Creates the forge for a target.
pub trait ForgeFactory: Send + Sync {
    fn forge_for(&self, target: &MigrationTarget) -> Result<Arc<dyn Forge>, ForgeError>;
}

impl<F> ForgeFactory for F
where
    F: Fn(&MigrationTarget) -> Result<Arc<dyn Forge>, ForgeError> + Send + Sync,
{
    fn forge_for(&self, target: &MigrationTarget) -> Result<Arc<dyn Forge>, ForgeError> {
        self(target)
    }
}

/// Factory backed by the real REST adapters.
#[derive(Debug, Clone)]
pub struct ProviderForgeFactory {
    credentials: Credentials,
    settings: HttpSettings,
}

impl ProviderForgeFactory {
    pub fn new(credentials: Credentials, settings: HttpSettings) -> Self {
        Self {
            credentials,
            settings,
        }
    }
}

impl ForgeFactory for ProviderForgeFactory {
    fn forge_for(&self, target: &MigrationTarget) -> Result<Arc<dyn Forge>, ForgeError> {
        create_forge(target, &self.credentials, &self.settings)
    }
}

/// Create the forge for a target from its `scmProvider`.
///
/// The repository name on the provider is the target name.
///
/// # Errors
///
/// - `ForgeError::AuthRequired` naming the variable to set when the token is missing
/// - `ForgeError::NotFound` if the target has no `scmProvider`
pub fn create_forge(
    target: &MigrationTarget,
    credentials: &Credentials,
    settings: &HttpSettings,
) -> Result<Arc<dyn Forge>, ForgeError> {
    let repo = target.name.as_str();
    match &target.scm_provider {
        Some(ScmProvider::AzureDevOps { base_url, project }) => {
            let pat = credentials
                .azure_devops_pat()
                .ok_or_else(|| ForgeError::AuthRequired(AZURE_DEVOPS_PAT.to_string()))?;
            let forge = AzureDevOpsForge::new(pat, base_url, project, repo, settings)?;
            Ok(Arc::new(forge))
        }
        Some(ScmProvider::GitHub {
            domain,
            owner_or_org,
        }) => {
            let token = credentials.github_token(domain).ok_or_else(|| {
                ForgeError::AuthRequired(Credentials::github_variable(domain).to_string())
            })?;
            let forge = GitHubForge::new(
                token,
                owner_or_org,
                repo,
                api_base_for_domain(domain),
                settings,
            )?;
            Ok(Arc::new(forge))
        }
        None => Err(ForgeError::NotFound(format!(
            "target '{}' has no scmProvider",
            repo
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::{GITHUB_ENTERPRISE_TOKEN, GITHUB_TOKEN};
    use crate::core::migration::SourceKind;
    use crate::core::types::TargetName;

    fn target(provider: Option<ScmProvider>) -> MigrationTarget {
        MigrationTarget {
            name: TargetName::new("svc").unwrap(),
            source: "https://example.test/svc.git".into(),
            source_kind: SourceKind::Remote,
            scm_provider: provider,
            pull_request: None,
        }
    }

    fn creds(pairs: &[(&str, &str)]) -> Credentials {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Credentials::from_lookup(move |key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
    }

    fn github(domain: &str) -> Option<ScmProvider> {
        Some(ScmProvider::GitHub {
            domain: domain.into(),
            owner_or_org: "acme".into(),
        })
    }

    #[test]
    fn github_uses_public_token() {
        let forge = create_forge(
            &target(github("github.com")),
            &creds(&[(GITHUB_TOKEN, "t")]),
            &HttpSettings::default(),
        )
        .unwrap();
        assert_eq!(forge.name(), "github");
    }

    #[test]
    fn enterprise_requires_enterprise_token() {
        let result = create_forge(
            &target(github("ghe.acme.io")),
            &creds(&[(GITHUB_TOKEN, "t")]),
            &HttpSettings::default(),
        );
        match result {
            Err(ForgeError::AuthRequired(var)) => assert_eq!(var, GITHUB_ENTERPRISE_TOKEN),
            other => panic!("expected AuthRequired, got {:?}", other.map(|f| f.name())),
        }
    }

    #[test]
    fn azure_requires_pat() {
        let provider = Some(ScmProvider::AzureDevOps {
            base_url: "https://dev.azure.com/acme".into(),
            project: "core".into(),
        });
        assert!(matches!(
            create_forge(&target(provider.clone()), &creds(&[]), &HttpSettings::default()),
            Err(ForgeError::AuthRequired(_))
        ));
        let forge = create_forge(
            &target(provider),
            &creds(&[(AZURE_DEVOPS_PAT, "p")]),
            &HttpSettings::default(),
        )
        .unwrap();
        assert_eq!(forge.name(), "azuredevops");
    }

    #[test]
    fn no_provider_is_not_found() {
        assert!(matches!(
            create_forge(&target(None), &creds(&[]), &HttpSettings::default()),
            Err(ForgeError::NotFound(_))
        ));
    }

    #[test]
    fn closures_are_factories() {
        let factory = |_: &MigrationTarget| -> Result<Arc<dyn Forge>, ForgeError> {
            Err(ForgeError::RateLimited)
        };
        assert!(factory.forge_for(&target(None)).is_err());
    }
}
