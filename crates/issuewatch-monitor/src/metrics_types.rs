//! Telemetry event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Telemetry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricCategory {
    AutoLabeling,
    ApiUsage,
    Performance,
    UserEngagement,
    Error,
    System,
}

impl MetricCategory {
    /// All categories, in display order.
    pub const ALL: [MetricCategory; 6] = [
        MetricCategory::AutoLabeling,
        MetricCategory::ApiUsage,
        MetricCategory::Performance,
        MetricCategory::UserEngagement,
        MetricCategory::Error,
        MetricCategory::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::AutoLabeling => "autoLabeling",
            MetricCategory::ApiUsage => "apiUsage",
            MetricCategory::Performance => "performance",
            MetricCategory::UserEngagement => "userEngagement",
            MetricCategory::Error => "error",
            MetricCategory::System => "system",
        }
    }
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one auto-labeling run, as reported by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLabelingEvent {
    #[serde(default)]
    pub issue_number: Option<u64>,
    /// Measured accuracy in `[0, 1]`, when ground truth is known.
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub labels_applied: Vec<String>,
    /// Whether a component label was detected.
    #[serde(default)]
    pub component_detected: bool,
    /// Whether a maintainer later replaced the applied labels.
    #[serde(default)]
    pub manual_override: bool,
}

/// One call to the hosting API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageEvent {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub rate_limit_remaining: Option<u32>,
    #[serde(default)]
    pub rate_limit_limit: Option<u32>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Timing of an internal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvent {
    pub operation: String,
    pub duration_ms: u64,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_success() -> bool {
    true
}

/// A user-facing interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEngagementEvent {
    pub action: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub issue_number: Option<u64>,
}

/// Error severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A failure somewhere in the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub component: String,
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub severity: ErrorSeverity,
}

/// A lifecycle or housekeeping event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Category-specific event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "camelCase")]
pub enum MetricPayload {
    AutoLabeling(AutoLabelingEvent),
    ApiUsage(ApiUsageEvent),
    Performance(PerformanceEvent),
    UserEngagement(UserEngagementEvent),
    Error(ErrorEvent),
    System(SystemEvent),
}

impl MetricPayload {
    pub fn category(&self) -> MetricCategory {
        match self {
            MetricPayload::AutoLabeling(_) => MetricCategory::AutoLabeling,
            MetricPayload::ApiUsage(_) => MetricCategory::ApiUsage,
            MetricPayload::Performance(_) => MetricCategory::Performance,
            MetricPayload::UserEngagement(_) => MetricCategory::UserEngagement,
            MetricPayload::Error(_) => MetricCategory::Error,
            MetricPayload::System(_) => MetricCategory::System,
        }
    }

    /// Check the required fields for this category.
    pub fn validate(&self) -> Result<(), MonitorError> {
        let category = self.category().as_str();
        let require = |ok: bool, reason: &str| {
            if ok {
                Ok(())
            } else {
                Err(MonitorError::invalid_event(category, reason))
            }
        };

        match self {
            MetricPayload::AutoLabeling(e) => {
                require(is_ratio(e.confidence), "confidence must be within [0, 1]")?;
                require(
                    e.accuracy.is_none_or(is_ratio),
                    "accuracy must be within [0, 1]",
                )
            }
            MetricPayload::ApiUsage(e) => {
                require(!e.endpoint.trim().is_empty(), "endpoint is required")?;
                require(
                    (100..=599).contains(&e.status_code),
                    "status_code must be a valid HTTP status",
                )
            }
            MetricPayload::Performance(e) => {
                require(!e.operation.trim().is_empty(), "operation is required")
            }
            MetricPayload::UserEngagement(e) => {
                require(!e.action.trim().is_empty(), "action is required")
            }
            MetricPayload::Error(e) => {
                require(!e.component.trim().is_empty(), "component is required")?;
                require(!e.message.trim().is_empty(), "message is required")
            }
            MetricPayload::System(e) => require(!e.event.trim().is_empty(), "event is required"),
        }
    }
}

fn is_ratio(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// One recorded telemetry event. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub timestamp: DateTime<Utc>,
    pub payload: MetricPayload,
}

impl MetricEvent {
    /// Stamp a payload with the current time.
    pub fn now(payload: MetricPayload) -> Self {
        Self::at(Utc::now(), payload)
    }

    /// Stamp a payload with an explicit time.
    pub fn at(timestamp: DateTime<Utc>, payload: MetricPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn category(&self) -> MetricCategory {
        self.payload.category()
    }
}
