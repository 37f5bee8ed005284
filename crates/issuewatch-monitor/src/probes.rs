//! Built-in health probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use issuewatch_config::ThresholdsConfig;
use issuewatch_protocols::{ClientError, Credential, RepositoryClient};

use crate::error::MonitorError;
use crate::health::ComponentHealth;
use crate::metrics::MetricsCollector;

/// Inputs shared by every probe in one check.
#[derive(Debug, Clone, Default)]
pub struct ProbeContext {
    pub credential: Option<Credential>,
}

impl ProbeContext {
    pub fn new(credential: Option<&Credential>) -> Self {
        Self {
            credential: credential.cloned(),
        }
    }
}

/// A single check of one dependency or component.
///
/// An `Err` marks the component unhealthy; it never aborts the aggregate
/// check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Component name reported in results.
    fn name(&self) -> &str;

    /// Whether the probe is part of the reduced interactive check.
    fn quick(&self) -> bool {
        true
    }

    async fn probe(&self, ctx: &ProbeContext) -> Result<ComponentHealth, MonitorError>;
}

/// API reachability and rate-limit budget.
pub struct GitHubApiProbe {
    client: Arc<dyn RepositoryClient>,
    rate_limit_threshold: f64,
}

impl GitHubApiProbe {
    pub fn new(client: Arc<dyn RepositoryClient>, rate_limit_threshold: f64) -> Self {
        Self {
            client,
            rate_limit_threshold,
        }
    }
}

#[async_trait]
impl HealthProbe for GitHubApiProbe {
    fn name(&self) -> &str {
        "github_api"
    }

    async fn probe(&self, ctx: &ProbeContext) -> Result<ComponentHealth, MonitorError> {
        let status = self.client.check_status(ctx.credential.as_ref()).await?;
        if !status.reachable {
            return Ok(ComponentHealth::unhealthy("API is unreachable"));
        }

        let mut details = json!({ "latency_ms": status.latency_ms });
        let health = match status.rate_limit {
            Some(rl) => {
                details["rate_limit_remaining"] = json!(rl.remaining);
                details["rate_limit_limit"] = json!(rl.limit);
                let ratio = rl.remaining_ratio();
                if ratio < self.rate_limit_threshold {
                    ComponentHealth::degraded(format!(
                        "Rate limit low: {}/{} remaining",
                        rl.remaining, rl.limit
                    ))
                } else {
                    ComponentHealth::healthy()
                }
            }
            None => ComponentHealth::healthy(),
        };
        Ok(health.with_details(details))
    }
}

/// Credential validity. Only part of full checks.
pub struct AuthenticationProbe {
    client: Arc<dyn RepositoryClient>,
}

impl AuthenticationProbe {
    pub fn new(client: Arc<dyn RepositoryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for AuthenticationProbe {
    fn name(&self) -> &str {
        "authentication"
    }

    fn quick(&self) -> bool {
        false
    }

    async fn probe(&self, ctx: &ProbeContext) -> Result<ComponentHealth, MonitorError> {
        let credential = match ctx.credential {
            Some(ref c) if !c.is_blank() => c,
            _ => return Ok(ComponentHealth::unhealthy("No credential provided")),
        };

        match self.client.authenticated_identity(credential).await {
            Ok(identity) => Ok(ComponentHealth::healthy()
                .with_message(format!("Authenticated as {}", identity.login))
                .with_details(json!({ "login": identity.login, "kind": identity.kind }))),
            Err(ClientError::Unauthorized(reason)) => Ok(ComponentHealth::unhealthy(format!(
                "Credential was rejected: {}",
                reason
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Recent classifier accuracy and processing time.
pub struct AutoLabelingProbe {
    metrics: Arc<MetricsCollector>,
    thresholds: ThresholdsConfig,
    window: Duration,
}

impl AutoLabelingProbe {
    pub fn new(metrics: Arc<MetricsCollector>, thresholds: ThresholdsConfig, window: Duration) -> Self {
        Self {
            metrics,
            thresholds,
            window,
        }
    }
}

#[async_trait]
impl HealthProbe for AutoLabelingProbe {
    fn name(&self) -> &str {
        "auto_labeling"
    }

    async fn probe(&self, _ctx: &ProbeContext) -> Result<ComponentHealth, MonitorError> {
        let summary = self.metrics.summary_for_last(self.window).auto_labeling;
        if summary.total == 0 {
            return Ok(ComponentHealth::healthy().with_message("No recent auto-labeling activity"));
        }

        let details = json!({
            "events": summary.total,
            "average_accuracy": summary.average_accuracy,
            "average_processing_time_ms": summary.average_processing_time_ms,
        });

        let mut problems = Vec::new();
        if summary.accuracy_samples > 0 && summary.average_accuracy < self.thresholds.accuracy {
            problems.push(format!(
                "accuracy {:.1}% below {:.1}%",
                summary.average_accuracy * 100.0,
                self.thresholds.accuracy * 100.0
            ));
        }
        if summary.average_processing_time_ms > self.thresholds.processing_time_ms as f64 {
            problems.push(format!(
                "processing time {:.0}ms above {}ms",
                summary.average_processing_time_ms, self.thresholds.processing_time_ms
            ));
        }

        let health = if problems.is_empty() {
            ComponentHealth::healthy()
        } else {
            ComponentHealth::degraded(problems.join("; "))
        };
        Ok(health.with_details(details))
    }
}

/// Recent error rate and API response time.
pub struct ApiPerformanceProbe {
    metrics: Arc<MetricsCollector>,
    thresholds: ThresholdsConfig,
    window: Duration,
}

impl ApiPerformanceProbe {
    pub fn new(metrics: Arc<MetricsCollector>, thresholds: ThresholdsConfig, window: Duration) -> Self {
        Self {
            metrics,
            thresholds,
            window,
        }
    }
}

#[async_trait]
impl HealthProbe for ApiPerformanceProbe {
    fn name(&self) -> &str {
        "api_performance"
    }

    async fn probe(&self, _ctx: &ProbeContext) -> Result<ComponentHealth, MonitorError> {
        let summary = self.metrics.summary_for_last(self.window);
        let api = &summary.api_usage;

        let mut problems = Vec::new();
        if summary.errors.error_rate > self.thresholds.error_rate {
            problems.push(format!(
                "error rate {:.2}% above {:.2}%",
                summary.errors.error_rate * 100.0,
                self.thresholds.error_rate * 100.0
            ));
        }
        if api.total_requests > 0
            && api.average_response_time_ms > self.thresholds.response_time_ms as f64
        {
            problems.push(format!(
                "response time {:.0}ms above {}ms",
                api.average_response_time_ms, self.thresholds.response_time_ms
            ));
        }

        let details = json!({
            "requests": api.total_requests,
            "success_rate": api.success_rate,
            "average_response_time_ms": api.average_response_time_ms,
            "error_rate": summary.errors.error_rate,
        });
        let health = if problems.is_empty() {
            ComponentHealth::healthy()
        } else {
            ComponentHealth::degraded(problems.join("; "))
        };
        Ok(health.with_details(details))
    }
}
