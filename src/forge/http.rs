//! forge::http
//!
//! HTTP plumbing shared by the REST adapters: client construction with a
//! per-request deadline, and the status-to-error mapping both providers use.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};

use super::traits::ForgeError;

/// Default User-Agent header value.
pub const DEFAULT_USER_AGENT: &str = concat!("converge/", env!("CARGO_PKG_VERSION"));

/// Client settings common to every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    /// Deadline applied to each request
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(180),
        }
    }
}

impl HttpSettings {
    pub fn client(&self) -> Result<Client, ForgeError> {
        Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .build()
            .map_err(|e| ForgeError::NetworkError(format!("failed to build HTTP client: {}", e)))
    }

    /// Map a transport failure, distinguishing deadline expiry.
    pub fn transport_error(&self, err: reqwest::Error) -> ForgeError {
        if err.is_timeout() {
            ForgeError::Timeout(self.timeout.as_secs())
        } else {
            ForgeError::NetworkError(err.to_string())
        }
    }
}

/// Whether a 403 is a rate limit rather than a permission failure.
///
/// GitHub signals an exhausted quota with `x-ratelimit-remaining: 0` and
/// its secondary limits with `retry-after`.
fn is_rate_limit(headers: &HeaderMap) -> bool {
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    exhausted || headers.contains_key(reqwest::header::RETRY_AFTER)
}

/// Map a non-success status to a `ForgeError`.
///
/// `provider` labels server errors ("GitHub server error: ...").
pub fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    message: String,
    provider: &str,
) -> ForgeError {
    match status {
        StatusCode::UNAUTHORIZED => ForgeError::AuthFailed(format!("invalid or expired token: {}", message)),
        StatusCode::FORBIDDEN if is_rate_limit(headers) => ForgeError::RateLimited,
        StatusCode::FORBIDDEN => ForgeError::AuthFailed(format!("permission denied: {}", message)),
        StatusCode::NOT_FOUND => ForgeError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
        _ if status.is_server_error() => ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("{} server error: {}", provider, message),
        },
        _ => ForgeError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error_bare(status: StatusCode, message: String, provider: &str) -> ForgeError {
        status_error(status, &HeaderMap::new(), message, provider)
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error_bare(StatusCode::UNAUTHORIZED, "x".into(), "GitHub"),
            ForgeError::AuthFailed(_)
        ));
        assert!(matches!(
            status_error_bare(StatusCode::FORBIDDEN, "x".into(), "GitHub"),
            ForgeError::AuthFailed(_)
        ));
        assert!(matches!(
            status_error_bare(StatusCode::NOT_FOUND, "x".into(), "GitHub"),
            ForgeError::NotFound(_)
        ));
        assert!(matches!(
            status_error_bare(StatusCode::CONFLICT, "x".into(), "GitHub"),
            ForgeError::ApiError { status: 409, .. }
        ));
        assert!(matches!(
            status_error_bare(StatusCode::UNPROCESSABLE_ENTITY, "x".into(), "GitHub"),
            ForgeError::ApiError { status: 422, .. }
        ));
        assert!(matches!(
            status_error_bare(StatusCode::TOO_MANY_REQUESTS, "x".into(), "GitHub"),
            ForgeError::RateLimited
        ));
        match status_error_bare(StatusCode::BAD_GATEWAY, "boom".into(), "Azure DevOps") {
            ForgeError::ApiError { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Azure DevOps server error: boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn forbidden_with_rate_limit_headers_is_rate_limited() {
        let mut exhausted = HeaderMap::new();
        exhausted.insert("x-ratelimit-remaining", "0".parse().unwrap());
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, &exhausted, "API rate limit exceeded".into(), "GitHub"),
            ForgeError::RateLimited
        ));

        let mut secondary = HeaderMap::new();
        secondary.insert(reqwest::header::RETRY_AFTER, "60".parse().unwrap());
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, &secondary, "slow down".into(), "GitHub"),
            ForgeError::RateLimited
        ));

        let mut remaining = HeaderMap::new();
        remaining.insert("x-ratelimit-remaining", "4999".parse().unwrap());
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, &remaining, "no access".into(), "GitHub"),
            ForgeError::AuthFailed(_)
        ));
    }

    #[test]
    fn default_user_agent_names_the_tool() {
        assert!(HttpSettings::default().user_agent.starts_with("converge/"));
    }
}
