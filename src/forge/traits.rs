//! forge::traits
//!
//! Forge trait definition for SCM providers.
//!
//! # Design
//!
//! The `Forge` trait is async because every operation is network I/O. The
//! reconciler is written once against `Arc<dyn Forge>`; each provider maps
//! its own REST shapes into the types below.
//!
//! Adapters never close or delete pull requests. An open PR that does not
//! carry the desired identity is reported, not touched.
//!
//! # Example
//!
//! ```ignore
//! use converge::forge::{Forge, PrIdentity};
//!
//! async fn check(forge: &dyn Forge) -> Result<(), ForgeError> {
//!     let identity = PrIdentity::new("feat/code-migration", "main", "Feat: Code Migration");
//!     if let Some(pr) = forge.find_matching_pr(&identity).await? {
//!         println!("already open: {}", pr.url);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors from forge operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// No token configured for this provider.
    #[error("authentication required: set {0}")]
    AuthRequired(String),

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The call did not complete before its deadline.
    #[error("request timed out after {0}s")]
    Timeout(u64),
}

impl ForgeError {
    /// Worth retrying: rate limits, timeouts, transport failures and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ForgeError::RateLimited | ForgeError::Timeout(_) | ForgeError::NetworkError(_) => true,
            ForgeError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Strip a `refs/heads/` prefix.
pub fn short_branch(name: &str) -> &str {
    name.strip_prefix("refs/heads/").unwrap_or(name)
}

/// Identity of the pull request a target converges on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrIdentity {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
}

impl PrIdentity {
    pub fn new(
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let source: String = source_branch.into();
        let target: String = target_branch.into();
        Self {
            source_branch: short_branch(&source).to_string(),
            target_branch: short_branch(&target).to_string(),
            title: title.into(),
        }
    }

    /// Does an open PR carry this identity?
    pub fn matches(&self, pr: &PullRequest) -> bool {
        short_branch(&pr.head) == self.source_branch
            && short_branch(&pr.base) == self.target_branch
            && pr.title.trim() == self.title.trim()
    }
}

/// Request to create a pull request.
#[derive(Debug, Clone, Default)]
pub struct CreatePrRequest {
    /// Source branch (short name)
    pub head: String,
    /// Target branch (short name)
    pub base: String,
    pub title: String,
    pub body: Option<String>,
    /// Azure DevOps labels, applied after creation
    pub labels: Vec<String>,
    /// Azure DevOps work items, linked after creation
    pub work_item_ids: Vec<String>,
    /// GitHub `maintainer_can_modify`
    pub maintainer_can_modify: Option<bool>,
}

/// Request to update a pull request description.
#[derive(Debug, Clone, Default)]
pub struct UpdatePrRequest {
    pub number: u64,
    pub body: Option<String>,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    /// PR number (pull request id on Azure DevOps)
    pub number: u64,
    /// Web URL for viewing
    pub url: String,
    /// Source branch, short name
    pub head: String,
    /// Target branch, short name
    pub base: String,
    pub title: String,
    pub body: Option<String>,
}

/// A created PR plus best-effort follow-ups that failed.
#[derive(Debug, Clone)]
pub struct CreatedPr {
    pub pr: PullRequest,
    pub warnings: Vec<String>,
}

/// The Forge trait for interacting with SCM providers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. Callers retry errors for
/// which [`ForgeError::is_transient`] holds and fail the target otherwise.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github", "azuredevops").
    fn name(&self) -> &'static str;

    /// Open pull requests whose source branch is `head`.
    async fn list_open_prs(&self, head: &str) -> Result<Vec<PullRequest>, ForgeError>;

    /// Create a pull request.
    ///
    /// # Errors
    ///
    /// - `AuthFailed` if the token is invalid or lacks permissions
    /// - `ApiError` with status 409/422 if the provider rejects the request
    async fn create_pr(&self, request: CreatePrRequest) -> Result<CreatedPr, ForgeError>;

    /// Replace the description/body of an existing pull request.
    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError>;

    /// The repository's default branch, short name.
    async fn default_branch(&self) -> Result<String, ForgeError>;

    /// The open PR carrying `identity`, if any.
    async fn find_matching_pr(
        &self,
        identity: &PrIdentity,
    ) -> Result<Option<PullRequest>, ForgeError> {
        let open = self.list_open_prs(&identity.source_branch).await?;
        Ok(open.into_iter().find(|pr| identity.matches(pr)))
    }
}
