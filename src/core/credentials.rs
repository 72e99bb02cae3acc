//! core::credentials
//!
//! Provider tokens read from the environment.
//!
//! Tokens are opaque: they are never parsed, and the `Debug` impl redacts
//! them so they cannot leak through logs or error chains.

use std::fmt;

pub const AZURE_DEVOPS_PAT: &str = "AZURE_DEVOPS_PAT";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_ENTERPRISE_TOKEN: &str = "GITHUB_ENTERPRISE_TOKEN";

/// Tokens available to the run.
#[derive(Clone, Default)]
pub struct Credentials {
    azure_devops_pat: Option<String>,
    github_token: Option<String>,
    github_enterprise_token: Option<String>,
}

impl Credentials {
    /// Read tokens from the process environment. Blank values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            azure_devops_pat: read(AZURE_DEVOPS_PAT),
            github_token: read(GITHUB_TOKEN),
            github_enterprise_token: read(GITHUB_ENTERPRISE_TOKEN),
        }
    }

    pub fn azure_devops_pat(&self) -> Option<&str> {
        self.azure_devops_pat.as_deref()
    }

    /// Token for a GitHub host: `GITHUB_TOKEN` for github.com, the
    /// enterprise token for any other domain.
    pub fn github_token(&self, domain: &str) -> Option<&str> {
        if domain.eq_ignore_ascii_case("github.com") {
            self.github_token.as_deref()
        } else {
            self.github_enterprise_token.as_deref()
        }
    }

    /// Variable that must be set for a GitHub host.
    pub fn github_variable(domain: &str) -> &'static str {
        if domain.eq_ignore_ascii_case("github.com") {
            GITHUB_TOKEN
        } else {
            GITHUB_ENTERPRISE_TOKEN
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "[REDACTED]" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("azure_devops_pat", &mark(&self.azure_devops_pat))
            .field("github_token", &mark(&self.github_token))
            .field("github_enterprise_token", &mark(&self.github_enterprise_token))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn creds(pairs: &[(&str, &str)]) -> Credentials {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Credentials::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn github_token_depends_on_domain() {
        let c = creds(&[(GITHUB_TOKEN, "public"), (GITHUB_ENTERPRISE_TOKEN, "ghe")]);
        assert_eq!(c.github_token("github.com"), Some("public"));
        assert_eq!(c.github_token("GitHub.com"), Some("public"));
        assert_eq!(c.github_token("ghe.acme.io"), Some("ghe"));
    }

    #[test]
    fn blank_values_are_unset() {
        let c = creds(&[(AZURE_DEVOPS_PAT, "   ")]);
        assert!(c.azure_devops_pat().is_none());
    }

    #[test]
    fn debug_redacts_tokens() {
        let c = creds(&[(AZURE_DEVOPS_PAT, "super-secret")]);
        let debug = format!("{c:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("<unset>"));
    }
}
