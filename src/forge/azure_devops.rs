//! forge::azure_devops
//!
//! Azure DevOps forge implementation using the Git REST API (7.0).
//!
//! # Authentication
//!
//! A personal access token sent as HTTP basic auth with an empty user name.
//!
//! # Post-create steps
//!
//! Labels and work-item links are separate calls made after the pull
//! request exists. They are best effort: a failure is returned as a warning
//! on [`CreatedPr`] and never fails the creation itself.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::http::{status_error, HttpSettings};
use super::traits::{
    short_branch, CreatePrRequest, CreatedPr, Forge, ForgeError, PullRequest, UpdatePrRequest,
};

const API_VERSION: &str = "7.0";

/// Azure DevOps forge implementation.
pub struct AzureDevOpsForge {
    client: Client,
    settings: HttpSettings,
    pat: String,
    /// Organization URL, e.g. `https://dev.azure.com/acme`
    base_url: String,
    project: String,
    repo: String,
}

// Custom Debug to avoid exposing the PAT
impl std::fmt::Debug for AzureDevOpsForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsForge")
            .field("pat", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("project", &self.project)
            .field("repo", &self.repo)
            .finish()
    }
}

impl AzureDevOpsForge {
    pub fn new(
        pat: impl Into<String>,
        base_url: impl Into<String>,
        project: impl Into<String>,
        repo: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, ForgeError> {
        Ok(Self {
            client: settings.client()?,
            settings: settings.clone(),
            pat: pat.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
            repo: repo.into(),
        })
    }

    /// URL under the organization with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ForgeError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ForgeError::ApiError {
            status: 0,
            message: format!("invalid baseUrl '{}': {}", self.base_url, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| ForgeError::ApiError {
                status: 0,
                message: format!("baseUrl '{}' cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{base}/{project}/_apis/git/repositories/{repo}/...`
    fn repo_endpoint(&self, rest: &[&str]) -> Result<Url, ForgeError> {
        let mut segments = vec![
            self.project.as_str(),
            "_apis",
            "git",
            "repositories",
            self.repo.as_str(),
        ];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    /// Browser URL of a pull request.
    fn web_url(&self, id: u64) -> String {
        match self.endpoint(&[
            self.project.as_str(),
            "_git",
            self.repo.as_str(),
            "pullrequest",
            &id.to_string(),
        ]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/{}/_git/{}/pullrequest/{}", self.base_url, self.project, self.repo, id),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth("", Some(&self.pat))
            .query(&[("api-version", API_VERSION)])
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ForgeError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.settings.transport_error(e))?;
        handle_response(response).await
    }

    fn into_pull_request(&self, pr: AdoPullRequest) -> PullRequest {
        PullRequest {
            number: pr.pull_request_id,
            url: self.web_url(pr.pull_request_id),
            head: short_branch(&pr.source_ref_name).to_string(),
            base: short_branch(&pr.target_ref_name).to_string(),
            title: pr.title,
            body: pr.description,
        }
    }

    async fn add_label(&self, pr_id: u64, label: &str) -> Result<(), ForgeError> {
        let url = self.repo_endpoint(&["pullRequests", &pr_id.to_string(), "labels"])?;
        let _: serde_json::Value = self
            .send(self.client.post(url).json(&LabelBody { name: label }))
            .await?;
        Ok(())
    }

    async fn link_work_item(
        &self,
        work_item: &str,
        pr_id: u64,
        project_id: &str,
        repo_id: &str,
    ) -> Result<(), ForgeError> {
        let url = self.endpoint(&[
            self.project.as_str(),
            "_apis",
            "wit",
            "workitems",
            work_item,
        ])?;
        let patch = vec![WorkItemPatch {
            op: "add",
            path: "/relations/-",
            value: WorkItemRelation {
                rel: "ArtifactLink",
                url: pull_request_artifact(project_id, repo_id, pr_id),
                attributes: RelationAttributes {
                    name: "Pull Request",
                },
            },
        }];
        let body = serde_json::to_vec(&patch).map_err(|e| ForgeError::ApiError {
            status: 0,
            message: e.to_string(),
        })?;
        let request = self
            .client
            .patch(url)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json-patch+json"),
            )
            .body(body);
        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }
}

/// Artifact URL linking a work item to a pull request.
///
/// ```
/// use converge::forge::azure_devops::pull_request_artifact;
///
/// assert_eq!(
///     pull_request_artifact("p1", "r1", 42),
///     "vstfs:///Git/PullRequestId/p1%2Fr1%2F42"
/// );
/// ```
pub fn pull_request_artifact(project_id: &str, repo_id: &str, pr_id: u64) -> String {
    format!(
        "vstfs:///Git/PullRequestId/{}%2F{}%2F{}",
        project_id, repo_id, pr_id
    )
}

async fn handle_response<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ForgeError> {
    let status = response.status();
    if status.is_success() {
        response.json().await.map_err(|e| ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("failed to parse response: {}", e),
        })
    } else {
        let headers = response.headers().clone();
        let message = match response.json::<AdoErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "unknown error".to_string(),
        };
        Err(status_error(status, &headers, message, "Azure DevOps"))
    }
}

#[async_trait]
impl Forge for AzureDevOpsForge {
    fn name(&self) -> &'static str {
        "azuredevops"
    }

    async fn list_open_prs(&self, head: &str) -> Result<Vec<PullRequest>, ForgeError> {
        let source_ref = format!("refs/heads/{}", short_branch(head));
        let url = self.repo_endpoint(&["pullrequests"])?;
        let request = self.client.get(url).query(&[
            ("searchCriteria.sourceRefName", source_ref.as_str()),
            ("searchCriteria.status", "active"),
        ]);

        let list: AdoList<AdoPullRequest> = self.send(request).await?;
        Ok(list
            .value
            .into_iter()
            .map(|pr| self.into_pull_request(pr))
            .collect())
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<CreatedPr, ForgeError> {
        let url = self.repo_endpoint(&["pullrequests"])?;
        let body = CreatePrBody {
            source_ref_name: format!("refs/heads/{}", short_branch(&request.head)),
            target_ref_name: format!("refs/heads/{}", short_branch(&request.base)),
            title: &request.title,
            description: request.body.as_deref(),
        };
        let created: AdoPullRequest = self.send(self.client.post(url).json(&body)).await?;

        let pr_id = created.pull_request_id;
        let repository = created.repository.clone();
        let pr = self.into_pull_request(created);

        let mut warnings = Vec::new();
        for label in &request.labels {
            if let Err(e) = self.add_label(pr_id, label).await {
                warn!(pr = pr_id, label = %label, error = %e, "failed to add label");
                warnings.push(format!("failed to add label '{}' to PR {}: {}", label, pr_id, e));
            }
        }

        if !request.work_item_ids.is_empty() {
            match repository {
                Some(repo) => {
                    for item in &request.work_item_ids {
                        if let Err(e) = self
                            .link_work_item(item, pr_id, &repo.project.id, &repo.id)
                            .await
                        {
                            warn!(pr = pr_id, work_item = %item, error = %e, "failed to link work item");
                            warnings.push(format!(
                                "failed to link work item {} to PR {}: {}",
                                item, pr_id, e
                            ));
                        }
                    }
                }
                None => warnings.push(format!(
                    "PR {} response carried no repository ids; work items not linked",
                    pr_id
                )),
            }
        }

        Ok(CreatedPr { pr, warnings })
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        let url = self.repo_endpoint(&["pullrequests", &request.number.to_string()])?;
        let body = UpdatePrBody {
            description: request.body.as_deref().unwrap_or(""),
        };
        let updated: AdoPullRequest = self.send(self.client.patch(url).json(&body)).await?;
        Ok(self.into_pull_request(updated))
    }

    async fn default_branch(&self) -> Result<String, ForgeError> {
        let url = self.repo_endpoint(&[])?;
        let repo: AdoRepository = self.send(self.client.get(url)).await?;
        repo.default_branch
            .map(|b| short_branch(&b).to_string())
            .ok_or_else(|| {
                ForgeError::NotFound(format!("repository '{}' has no default branch", self.repo))
            })
    }
}

// --------------------------------------------------------------------------
// Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePrBody<'a> {
    source_ref_name: String,
    target_ref_name: String,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct UpdatePrBody<'a> {
    description: &'a str,
}

#[derive(Serialize)]
struct LabelBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct WorkItemPatch {
    op: &'static str,
    path: &'static str,
    value: WorkItemRelation,
}

#[derive(Serialize)]
struct WorkItemRelation {
    rel: &'static str,
    url: String,
    attributes: RelationAttributes,
}

#[derive(Serialize)]
struct RelationAttributes {
    name: &'static str,
}

#[derive(Deserialize)]
struct AdoList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoPullRequest {
    pull_request_id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    source_ref_name: String,
    target_ref_name: String,
    #[serde(default)]
    repository: Option<AdoRepositoryRef>,
}

#[derive(Deserialize, Clone)]
struct AdoRepositoryRef {
    id: String,
    project: AdoProjectRef,
}

#[derive(Deserialize, Clone)]
struct AdoProjectRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdoRepository {
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct AdoErrorResponse {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forge(base: &str, project: &str, repo: &str) -> AzureDevOpsForge {
        AzureDevOpsForge::new("pat-secret", base, project, repo, &HttpSettings::default()).unwrap()
    }

    #[test]
    fn endpoints_encode_segments() {
        let forge = forge("https://dev.azure.com/acme/", "Core Platform", "svc");
        let url = forge.repo_endpoint(&["pullrequests"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/acme/Core%20Platform/_apis/git/repositories/svc/pullrequests"
        );
    }

    #[test]
    fn web_url_points_at_pull_request() {
        let forge = forge("https://dev.azure.com/acme", "core", "svc");
        assert_eq!(
            forge.web_url(12),
            "https://dev.azure.com/acme/core/_git/svc/pullrequest/12"
        );
    }

    #[test]
    fn debug_redacts_pat() {
        let forge = forge("https://dev.azure.com/acme", "core", "svc");
        let debug = format!("{forge:?}");
        assert!(!debug.contains("pat-secret"));
        assert!(debug.contains("core"));
    }

    #[test]
    fn pull_request_conversion_strips_refs() {
        let forge = forge("https://dev.azure.com/acme", "core", "svc");
        let pr: AdoPullRequest = serde_json::from_str(
            r#"{"pullRequestId": 5, "title": "T", "sourceRefName": "refs/heads/feat/x",
                "targetRefName": "refs/heads/main",
                "repository": {"id": "r", "project": {"id": "p"}}}"#,
        )
        .unwrap();
        let pr = forge.into_pull_request(pr);
        assert_eq!(pr.head, "feat/x");
        assert_eq!(pr.base, "main");
        assert!(pr.body.is_none());
    }

    #[test]
    fn work_item_patch_shape() {
        let patch = vec![WorkItemPatch {
            op: "add",
            path: "/relations/-",
            value: WorkItemRelation {
                rel: "ArtifactLink",
                url: pull_request_artifact("p", "r", 3),
                attributes: RelationAttributes {
                    name: "Pull Request",
                },
            },
        }];
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json[0]["value"]["rel"], "ArtifactLink");
        assert_eq!(json[0]["value"]["url"], "vstfs:///Git/PullRequestId/p%2Fr%2F3");
    }
}
