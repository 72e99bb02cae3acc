//! HTTP-level tests for the GitHub and Azure DevOps adapters.
//!
//! Each test serves the provider's REST endpoints from a local wiremock
//! server and checks both the request shape and the mapping of responses.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use converge::forge::azure_devops::AzureDevOpsForge;
use converge::forge::github::GitHubForge;
use converge::forge::{CreatePrRequest, Forge, ForgeError, HttpSettings, UpdatePrRequest};

fn settings() -> HttpSettings {
    HttpSettings {
        user_agent: "converge-tests".into(),
        timeout: Duration::from_secs(5),
    }
}

// =============================================================================
// GitHub
// =============================================================================

mod github {
    use super::*;

    fn forge(server: &MockServer) -> GitHubForge {
        GitHubForge::new("gh-token", "acme", "svc", server.uri(), &settings()).unwrap()
    }

    fn pr_json(number: u64, title: &str, body: Option<&str>) -> serde_json::Value {
        json!({
            "number": number,
            "html_url": format!("https://github.com/acme/svc/pull/{number}"),
            "head": {"ref": "feat/code-migration"},
            "base": {"ref": "main"},
            "title": title,
            "body": body
        })
    }

    #[tokio::test]
    async fn list_open_prs_filters_by_owner_and_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/svc/pulls"))
            .and(query_param("head", "acme:feat/code-migration"))
            .and(query_param("state", "open"))
            .and(query_param("per_page", "100"))
            .and(header("authorization", "Bearer gh-token"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("user-agent", "converge-tests"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([pr_json(4, "Feat: Code Migration", Some("body"))])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let prs = forge(&server)
            .list_open_prs("refs/heads/feat/code-migration")
            .await
            .unwrap();

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].number, 4);
        assert_eq!(prs[0].head, "feat/code-migration");
        assert_eq!(prs[0].base, "main");
        assert_eq!(prs[0].body.as_deref(), Some("body"));
        assert_eq!(prs[0].url, "https://github.com/acme/svc/pull/4");
    }

    #[tokio::test]
    async fn create_pr_sends_maintainer_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/svc/pulls"))
            .and(body_json(json!({
                "head": "feat/code-migration",
                "base": "main",
                "title": "Feat: Code Migration",
                "body": "Automated migration",
                "maintainer_can_modify": false
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(pr_json(9, "Feat: Code Migration", Some("Automated migration"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let created = forge(&server)
            .create_pr(CreatePrRequest {
                head: "feat/code-migration".into(),
                base: "main".into(),
                title: "Feat: Code Migration".into(),
                body: Some("Automated migration".into()),
                maintainer_can_modify: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.pr.number, 9);
        assert!(created.warnings.is_empty());
    }

    #[tokio::test]
    async fn azure_only_fields_become_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/svc/pulls"))
            .respond_with(ResponseTemplate::new(201).set_body_json(pr_json(1, "T", None)))
            .mount(&server)
            .await;

        let created = forge(&server)
            .create_pr(CreatePrRequest {
                head: "feat/code-migration".into(),
                base: "main".into(),
                title: "T".into(),
                labels: vec!["migration".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.warnings.len(), 1);
    }

    #[tokio::test]
    async fn update_pr_patches_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/acme/svc/pulls/9"))
            .and(body_json(json!({"body": "fresh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(9, "T", Some("fresh"))))
            .expect(1)
            .mount(&server)
            .await;

        let pr = forge(&server)
            .update_pr(UpdatePrRequest {
                number: 9,
                body: Some("fresh".into()),
            })
            .await
            .unwrap();
        assert_eq!(pr.body.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn default_branch_from_repository() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/svc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"default_branch": "trunk"})))
            .mount(&server)
            .await;

        assert_eq!(forge(&server).default_branch().await.unwrap(), "trunk");
    }

    #[tokio::test]
    async fn validation_errors_carry_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/svc/pulls"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{"message": "A pull request already exists for acme:feat/code-migration."}]
            })))
            .mount(&server)
            .await;

        let err = forge(&server)
            .create_pr(CreatePrRequest {
                head: "feat/code-migration".into(),
                base: "main".into(),
                title: "T".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        match err {
            ForgeError::ApiError { status, message } => {
                assert_eq!(status, 422);
                assert!(message.contains("already exists"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_codes_map_to_error_classes() {
        let cases: [(u16, Option<(&str, &str)>, &str); 7] = [
            (401, None, "auth"),
            (403, None, "auth"),
            (403, Some(("x-ratelimit-remaining", "0")), "rate"),
            (403, Some(("retry-after", "60")), "rate"),
            (404, None, "not_found"),
            (429, None, "rate"),
            (503, None, "server"),
        ];
        for (status, extra_header, class) in cases {
            let server = MockServer::start().await;
            let mut template = ResponseTemplate::new(status)
                .set_body_json(json!({"message": "API rate limit exceeded for user ID 1."}));
            if let Some((name, value)) = extra_header {
                template = template.insert_header(name, value);
            }
            Mock::given(method("GET"))
                .respond_with(template)
                .mount(&server)
                .await;

            let err = forge(&server).default_branch().await.unwrap_err();
            let got = match &err {
                ForgeError::AuthFailed(_) => "auth",
                ForgeError::NotFound(_) => "not_found",
                ForgeError::RateLimited => "rate",
                ForgeError::ApiError { status: 503, .. } => "server",
                _ => "other",
            };
            assert_eq!(got, class, "status {status} {extra_header:?}: {err:?}");
            assert_eq!(err.is_transient(), matches!(class, "rate" | "server"));
        }
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"default_branch": "main"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let settings = HttpSettings {
            timeout: Duration::from_secs(1),
            ..settings()
        };
        let forge = GitHubForge::new("t", "acme", "svc", server.uri(), &settings).unwrap();
        let err = forge.default_branch().await.unwrap_err();
        assert!(matches!(err, ForgeError::Timeout(1)), "{err:?}");
        assert!(err.is_transient());
    }
}

// =============================================================================
// Azure DevOps
// =============================================================================

mod azure_devops {
    use super::*;

    const PRS: &str = "/core/_apis/git/repositories/svc/pullrequests";

    fn forge(server: &MockServer) -> AzureDevOpsForge {
        AzureDevOpsForge::new("ado-pat", server.uri(), "core", "svc", &settings()).unwrap()
    }

    fn pr_json(id: u64, title: &str, description: Option<&str>) -> serde_json::Value {
        json!({
            "pullRequestId": id,
            "title": title,
            "description": description,
            "sourceRefName": "refs/heads/feat/code-migration",
            "targetRefName": "refs/heads/main",
            "repository": {"id": "repo-id", "project": {"id": "proj-id"}}
        })
    }

    fn request(labels: &[&str], work_items: &[&str]) -> CreatePrRequest {
        CreatePrRequest {
            head: "feat/code-migration".into(),
            base: "main".into(),
            title: "Feat: Code Migration".into(),
            body: Some("Automated migration".into()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            work_item_ids: work_items.iter().map(|w| w.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_open_prs_queries_active_source_ref() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PRS))
            .and(query_param("searchCriteria.sourceRefName", "refs/heads/feat/code-migration"))
            .and(query_param("searchCriteria.status", "active"))
            .and(query_param("api-version", "7.0"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "value": [pr_json(12, "Feat: Code Migration", None)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let prs = forge(&server).list_open_prs("feat/code-migration").await.unwrap();

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].number, 12);
        assert_eq!(prs[0].head, "feat/code-migration");
        assert_eq!(prs[0].base, "main");
        assert_eq!(
            prs[0].url,
            format!("{}/core/_git/svc/pullrequest/12", server.uri())
        );
    }

    #[tokio::test]
    async fn create_pr_adds_labels_and_links_work_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PRS))
            .and(body_json(json!({
                "sourceRefName": "refs/heads/feat/code-migration",
                "targetRefName": "refs/heads/main",
                "title": "Feat: Code Migration",
                "description": "Automated migration"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(pr_json(
                9,
                "Feat: Code Migration",
                Some("Automated migration"),
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/core/_apis/git/repositories/svc/pullRequests/9/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "x"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/core/_apis/wit/workitems/123"))
            .and(header("content-type", "application/json-patch+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 123})))
            .expect(1)
            .mount(&server)
            .await;

        let created = forge(&server)
            .create_pr(request(&["migration", "automated"], &["123"]))
            .await
            .unwrap();

        assert_eq!(created.pr.number, 9);
        assert!(created.warnings.is_empty(), "{:?}", created.warnings);
    }

    #[tokio::test]
    async fn failed_label_is_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PRS))
            .respond_with(ResponseTemplate::new(201).set_body_json(pr_json(9, "T", None)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/core/_apis/git/repositories/svc/pullRequests/9/labels"))
            .and(body_partial_json(json!({"name": "broken"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad label"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/core/_apis/git/repositories/svc/pullRequests/9/labels"))
            .and(body_partial_json(json!({"name": "fine"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "fine"})))
            .mount(&server)
            .await;

        let created = forge(&server)
            .create_pr(request(&["broken", "fine"], &[]))
            .await
            .unwrap();

        assert_eq!(created.pr.number, 9);
        assert_eq!(created.warnings.len(), 1);
        assert!(created.warnings[0].contains("broken"));
        assert!(created.warnings[0].contains("bad label"));
    }

    #[tokio::test]
    async fn update_pr_patches_description() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{PRS}/9")))
            .and(body_json(json!({"description": "fresh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(9, "T", Some("fresh"))))
            .expect(1)
            .mount(&server)
            .await;

        let pr = forge(&server)
            .update_pr(UpdatePrRequest {
                number: 9,
                body: Some("fresh".into()),
            })
            .await
            .unwrap();
        assert_eq!(pr.body.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn default_branch_is_shortened() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/core/_apis/git/repositories/svc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"defaultBranch": "refs/heads/develop"})),
            )
            .mount(&server)
            .await;

        assert_eq!(forge(&server).default_branch().await.unwrap(), "develop");
    }

    #[tokio::test]
    async fn unauthorized_is_auth_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = forge(&server).list_open_prs("feat/x").await.unwrap_err();
        assert!(matches!(err, ForgeError::AuthFailed(_)), "{err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn token_never_appears_in_debug_output() {
        let server = MockServer::start().await;
        let rendered = format!("{:?}", forge(&server));
        assert!(!rendered.contains("ado-pat"));
        assert!(rendered.contains("REDACTED"));
    }
}
