//! Hosting API client and filesystem helpers for IssueWatch.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use issuewatch_config::GitHubConfig;
use issuewatch_monitor::{ApiUsageEvent, ErrorEvent, ErrorSeverity, MetricsCollector};
use issuewatch_protocols::{ApiStatus, ClientError, Credential, Identity, RateLimit, RepositoryClient};

/// Component name for errors recorded by the API client.
const CLIENT_COMPONENT: &str = "github_client";

/// Get the ~/.issuewatch directory path.
pub(crate) fn issuewatch_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".issuewatch"))
        .unwrap_or_else(|| PathBuf::from(".issuewatch"))
}

#[derive(Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Deserialize)]
struct RateLimitResources {
    core: CoreRateLimit,
}

#[derive(Deserialize)]
struct CoreRateLimit {
    limit: u32,
    remaining: u32,
    #[serde(default)]
    reset: Option<i64>,
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// GitHub REST client used by the health probes.
///
/// Once a collector is attached, every request is recorded as an API usage
/// event and every transport failure as an error event.
pub(crate) struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
    metrics: OnceLock<Arc<MetricsCollector>>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
            metrics: OnceLock::new(),
        })
    }

    /// Record later requests in `metrics`. Only the first collector sticks.
    pub fn attach_metrics(&self, metrics: Arc<MetricsCollector>) {
        if self.metrics.set(metrics).is_err() {
            warn!("GitHub client already has a metrics collector attached");
        }
    }

    /// Send a GET and record it. Returns the response and its latency.
    async fn send(
        &self,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<(reqwest::Response, u64), ClientError> {
        let started = Instant::now();
        let result = self.get(path, credential).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                self.record_usage(path, &response, latency_ms);
                Ok((response, latency_ms))
            }
            Err(e) => {
                let err = self.send_error(e);
                self.record_failure(path, &err);
                Err(err)
            }
        }
    }

    fn record_usage(&self, path: &str, response: &reqwest::Response, latency_ms: u64) {
        let Some(metrics) = self.metrics.get() else {
            return;
        };
        let status = response.status();
        let event = ApiUsageEvent {
            endpoint: path.to_string(),
            method: "GET".to_string(),
            status_code: status.as_u16(),
            response_time_ms: latency_ms,
            success: status.is_success(),
            rate_limit_remaining: header_u32(response.headers(), "x-ratelimit-remaining"),
            rate_limit_limit: header_u32(response.headers(), "x-ratelimit-limit"),
        };
        if let Err(e) = metrics.track_api_usage(event) {
            debug!("Dropped API usage event for {}: {}", path, e);
        }
    }

    fn record_failure(&self, path: &str, err: &ClientError) {
        let Some(metrics) = self.metrics.get() else {
            return;
        };
        let error_type = match err {
            ClientError::Timeout(_) => "Timeout",
            _ => "Unreachable",
        };
        let event = ErrorEvent {
            component: CLIENT_COMPONENT.to_string(),
            error_type: error_type.to_string(),
            message: format!("GET {}: {}", path, err),
            severity: ErrorSeverity::High,
        };
        if let Err(e) = metrics.track_error(event) {
            debug!("Dropped client error event for {}: {}", path, e);
        }
    }

    fn get(&self, path: &str, credential: Option<&Credential>) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json");
        match credential.filter(|c| !c.is_blank()) {
            Some(c) => request.bearer_auth(c.expose()),
            None => request,
        }
    }

    fn send_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout_secs)
        } else {
            ClientError::Unreachable(e.to_string())
        }
    }

    /// Map a non-success response to a client error.
    async fn status_error(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
            _ => ClientError::Status {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl RepositoryClient for GitHubClient {
    async fn check_status(&self, credential: Option<&Credential>) -> Result<ApiStatus, ClientError> {
        let (response, latency_ms) = self.send("/rate_limit", credential).await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: RateLimitResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let core = body.resources.core;

        Ok(ApiStatus {
            reachable: true,
            latency_ms,
            rate_limit: Some(RateLimit {
                limit: core.limit,
                remaining: core.remaining,
                reset_at: core.reset.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            }),
        })
    }

    async fn authenticated_identity(&self, credential: &Credential) -> Result<Identity, ClientError> {
        let (response, _) = self.send("/user", Some(credential)).await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(Identity {
            login: user.login,
            kind: user.kind,
        })
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
