//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`TargetName`] - Unique key of a migration target
//!
//! # Validation
//!
//! These types enforce validity at construction time. A configuration that
//! names an impossible branch is rejected while loading, long before any
//! repository is touched.
//!
//! # Examples
//!
//! ```
//! use converge::core::types::{BranchName, Oid};
//!
//! let branch = BranchName::new("feat/code-migration").unwrap();
//! assert_eq!(branch.local_ref(), "refs/heads/feat/code-migration");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid target name: {0}")]
    InvalidTargetName(String),
}

const BRANCH_PREFIX: &str = "refs/heads/";

/// A validated Git branch name.
///
/// Branch names follow Git's refname rules (see `git check-ref-format`).
/// Names given in configuration may carry a `refs/heads/` prefix, which is
/// stripped: Azure DevOps configs habitually spell `targetRefName` that way.
///
/// # Example
///
/// ```
/// use converge::core::types::BranchName;
///
/// let name = BranchName::new("refs/heads/main").unwrap();
/// assert_eq!(name.as_str(), "main");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name, stripping any `refs/heads/` prefix.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let name = match name.strip_prefix(BRANCH_PREFIX) {
            Some(short) => short.to_string(),
            None => name,
        };
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let reject = |why: &str| Err(TypeError::InvalidBranchName(format!("'{name}' {why}")));

        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return reject("is reserved");
        }
        if name.starts_with('-') {
            return reject("cannot start with '-'");
        }
        if name.ends_with('/') {
            return reject("cannot end with '/'");
        }
        for forbidden in ["..", "@{", "//"] {
            if name.contains(forbidden) {
                return reject(&format!("cannot contain '{forbidden}'"));
            }
        }
        if let Some(c) = name
            .chars()
            .find(|c| c.is_ascii_control() || " ~^:\\?*[".contains(*c))
        {
            return reject(&format!("cannot contain {c:?}"));
        }
        for component in name.split('/') {
            if component.starts_with('.') {
                return reject("has a component starting with '.'");
            }
            if component.ends_with(".lock") {
                return reject("has a component ending with '.lock'");
            }
        }

        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full local ref (`refs/heads/<name>`).
    pub fn local_ref(&self) -> String {
        format!("{BRANCH_PREFIX}{}", self.0)
    }

    /// Remote-tracking ref (`refs/remotes/<remote>/<name>`).
    pub fn remote_ref(&self, remote: &str) -> String {
        format!("refs/remotes/{remote}/{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256), normalized to lowercase.
///
/// # Example
///
/// ```
/// use converge::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a 40 or 64
    /// character hex id.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// Get an abbreviated form of the OID.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique key of a migration target.
///
/// Doubles as the repository name on the SCM provider and as the first
/// segment of `filesToExclude` entries, so it must not contain a path
/// separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetName(String);

impl TargetName {
    /// Create a new validated target name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTargetName` for empty names, names with
    /// surrounding whitespace, path separators or control characters.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TypeError::InvalidTargetName(
                "target name cannot be empty".into(),
            ));
        }
        if name.trim() != name {
            return Err(TypeError::InvalidTargetName(format!(
                "'{name}' has surrounding whitespace"
            )));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(TypeError::InvalidTargetName(format!(
                "'{name}' cannot contain a path separator"
            )));
        }
        if name == "." || name == ".." || name.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidTargetName(format!(
                "'{}' is not a usable name",
                name.escape_debug()
            )));
        }
        Ok(Self(name))
    }

    /// Get the target name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TargetName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TargetName> for String {
    fn from(name: TargetName) -> Self {
        name.0
    }
}

impl std::fmt::Display for TargetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
