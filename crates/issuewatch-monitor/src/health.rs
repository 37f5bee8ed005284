//! Health check result types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::AlertLevel;

/// Health status, ordered from best to worst.
///
/// `Unknown` sorts below `Healthy` so that it never wins a "worst of"
/// aggregation once any probe has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No probe has reported.
    Unknown,
    /// Component is healthy.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component is unhealthy.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl HealthStatus {
    /// Worst of the given statuses, `Unknown` when empty.
    pub fn worst<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses
            .into_iter()
            .max()
            .unwrap_or(HealthStatus::Unknown)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "\u{2705}",
            HealthStatus::Degraded => "\u{26a0}\u{fe0f}",
            HealthStatus::Unhealthy => "\u{274c}",
            HealthStatus::Unknown => "\u{2753}",
        }
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with_status(HealthStatus::Healthy, None::<String>)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, Some(message))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, Some(message))
    }

    fn with_status(status: HealthStatus, message: Option<impl Into<String>>) -> Self {
        Self {
            status,
            message: message.map(Into::into),
            response_time_ms: 0,
            details: None,
        }
    }

    /// Set details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Set a message (keeps the status).
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Headline numbers captured alongside a health check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetricsSnapshot {
    pub total_events: u64,
    pub error_rate: f64,
    pub api_success_rate: f64,
    pub average_accuracy: f64,
}

/// Alert suggestion derived from a non-healthy component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub level: AlertLevel,
    pub component: String,
    pub message: String,
}

/// One completed health check. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub timestamp: DateTime<Utc>,
    pub overall: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub metrics: HealthMetricsSnapshot,
    pub alerts: Vec<HealthAlert>,
    pub duration_ms: u64,
    /// Whether this was a reduced interactive check.
    pub quick: bool,
}

impl HealthCheckResult {
    /// Assemble a result; `overall` and `alerts` derive from `components`.
    pub fn new(
        components: BTreeMap<String, ComponentHealth>,
        metrics: HealthMetricsSnapshot,
        duration_ms: u64,
        quick: bool,
    ) -> Self {
        let overall = HealthStatus::worst(components.values().map(|c| c.status));
        let alerts = components
            .iter()
            .filter_map(|(name, c)| {
                let level = match c.status {
                    HealthStatus::Unhealthy => AlertLevel::Critical,
                    HealthStatus::Degraded => AlertLevel::Warning,
                    _ => return None,
                };
                Some(HealthAlert {
                    level,
                    component: name.clone(),
                    message: c
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("{} is {}", name, c.status)),
                })
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            overall,
            components,
            metrics,
            alerts,
            duration_ms,
            quick,
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.overall == HealthStatus::Unhealthy
    }
}
