//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Hosts
//!
//! `github.com` is served from `https://api.github.com`; any other domain
//! is treated as GitHub Enterprise Server at `https://{domain}/api/v3`.
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` on 429, and on a 403 that carries
//! GitHub's rate-limit headers. Retrying is the caller's job.
//!
//! # Example
//!
//! ```ignore
//! use converge::forge::github::GitHubForge;
//! use converge::forge::{Forge, HttpSettings};
//!
//! let forge = GitHubForge::new(token, "acme", "payments", "https://api.github.com", &HttpSettings::default())?;
//! let open = forge.list_open_prs("feat/code-migration").await?;
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::http::{status_error, HttpSettings};
use super::traits::{
    short_branch, CreatePrRequest, CreatedPr, Forge, ForgeError, PullRequest, UpdatePrRequest,
};

/// GitHub API base URL for github.com.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// API base URL for a GitHub host.
///
/// ```
/// use converge::forge::github::api_base_for_domain;
///
/// assert_eq!(api_base_for_domain("github.com"), "https://api.github.com");
/// assert_eq!(api_base_for_domain("ghe.acme.io"), "https://ghe.acme.io/api/v3");
/// ```
pub fn api_base_for_domain(domain: &str) -> String {
    if domain.eq_ignore_ascii_case("github.com") {
        DEFAULT_API_BASE.to_string()
    } else {
        format!("https://{}/api/v3", domain)
    }
}

/// GitHub forge implementation.
pub struct GitHubForge {
    client: Client,
    settings: HttpSettings,
    token: String,
    /// Repository owner (user or organization)
    owner: String,
    repo: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("token", &"[REDACTED]")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    /// Create a GitHub forge for `owner/repo` served from `api_base`.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        api_base: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, ForgeError> {
        Ok(Self {
            client: settings.client()?,
            settings: settings.clone(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo)
        } else {
            format!(
                "{}/repos/{}/{}/{}",
                self.api_base, self.owner, self.repo, path
            )
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ForgeError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| self.settings.transport_error(e))?;
        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("failed to parse response: {}", e),
            })
        } else {
            let headers = response.headers().clone();
            let message = match response.json::<GitHubErrorResponse>().await {
                Ok(err) => err.describe(),
                Err(_) => "unknown error".to_string(),
            };
            Err(status_error(status, &headers, message, "GitHub"))
        }
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_open_prs(&self, head: &str) -> Result<Vec<PullRequest>, ForgeError> {
        let head_param = format!("{}:{}", self.owner, short_branch(head));
        let request = self
            .client
            .get(self.repo_url("pulls"))
            .query(&[
                ("head", head_param.as_str()),
                ("state", "open"),
                ("per_page", "100"),
            ]);

        let prs: Vec<GitHubPullRequest> = self.send(request).await?;
        Ok(prs.into_iter().map(PullRequest::from).collect())
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<CreatedPr, ForgeError> {
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
            maintainer_can_modify: request.maintainer_can_modify,
        };

        let pr: GitHubPullRequest = self
            .send(self.client.post(self.repo_url("pulls")).json(&body))
            .await?;

        let mut warnings = Vec::new();
        if !request.labels.is_empty() || !request.work_item_ids.is_empty() {
            warnings.push("labels and work items are Azure DevOps features; ignored on GitHub".into());
        }

        Ok(CreatedPr {
            pr: pr.into(),
            warnings,
        })
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        let body = UpdatePrBody {
            body: request.body.as_deref().unwrap_or(""),
        };
        let pr: GitHubPullRequest = self
            .send(
                self.client
                    .patch(self.repo_url(&format!("pulls/{}", request.number)))
                    .json(&body),
            )
            .await?;
        Ok(pr.into())
    }

    async fn default_branch(&self) -> Result<String, ForgeError> {
        let repo: GitHubRepository = self.send(self.client.get(self.repo_url(""))).await?;
        Ok(repo.default_branch)
    }
}

// --------------------------------------------------------------------------
// Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintainer_can_modify: Option<bool>,
}

/// Request body for updating a PR.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    body: &'a str,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl GitHubErrorResponse {
    /// Validation failures carry the useful detail in `errors`.
    fn describe(&self) -> String {
        let details: Vec<String> = self
            .errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, details.join("; "))
        }
    }
}

#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    head: GitHubRef,
    base: GitHubRef,
    title: String,
    body: Option<String>,
}

/// GitHub ref (head/base) format.
#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct GitHubRepository {
    default_branch: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: short_branch(&pr.head.ref_name).to_string(),
            base: short_branch(&pr.base.ref_name).to_string(),
            title: pr.title,
            body: pr.body,
        }
    }
}
