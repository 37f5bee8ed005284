//! Monitoring, alert threshold and notification configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::default_true;

/// Monitoring engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Whether the periodic cycle runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Evaluation cycle interval in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Upper bound for one whole evaluation cycle, in seconds.
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// How long metric events stay queryable.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Hard cap on stored metric events (oldest evicted first).
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Health results kept in history.
    #[serde(default = "default_health_history")]
    pub health_history_size: usize,

    /// Resolved alerts kept in history.
    #[serde(default = "default_alert_history")]
    pub alert_history_size: usize,

    /// Trailing window evaluated on each cycle, in seconds.
    #[serde(default = "default_summary_window")]
    pub summary_window_secs: u64,

    /// Refuse to start when the initial health check is unhealthy.
    #[serde(default)]
    pub require_healthy_start: bool,

    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_cycle_timeout() -> u64 {
    120
}

fn default_retention_days() -> u32 {
    30
}

fn default_max_events() -> usize {
    100_000
}

fn default_health_history() -> usize {
    100
}

fn default_alert_history() -> usize {
    1000
}

fn default_summary_window() -> u64 {
    3600
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval(),
            probe_timeout_secs: default_probe_timeout(),
            cycle_timeout_secs: default_cycle_timeout(),
            retention_days: default_retention_days(),
            max_events: default_max_events(),
            health_history_size: default_health_history(),
            alert_history_size: default_alert_history(),
            summary_window_secs: default_summary_window(),
            require_healthy_start: false,
            thresholds: ThresholdsConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl MonitoringConfig {
    /// Cycle interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Whole-cycle timeout.
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// Metric retention window.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }

    /// Trailing summary window.
    pub fn summary_window(&self) -> Duration {
        Duration::from_secs(self.summary_window_secs)
    }
}

/// Alert rule thresholds. Read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Errors per operation above which an alert fires.
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,

    /// Average API response time (ms) above which an alert fires.
    #[serde(default = "default_response_time")]
    pub response_time_ms: u64,

    /// Remaining fraction of the rate-limit budget below which an alert fires.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Average classifier accuracy below which an alert fires.
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,

    /// Average classifier processing time (ms) above which an alert fires.
    #[serde(default = "default_processing_time")]
    pub processing_time_ms: u64,

    /// Minimum time between two notifications for the same alert key.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_error_rate() -> f64 {
    0.05
}

fn default_response_time() -> u64 {
    5000
}

fn default_rate_limit() -> f64 {
    0.1
}

fn default_accuracy() -> f64 {
    0.7
}

fn default_processing_time() -> u64 {
    10_000
}

fn default_cooldown() -> u64 {
    300
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            error_rate: default_error_rate(),
            response_time_ms: default_response_time(),
            rate_limit: default_rate_limit(),
            accuracy: default_accuracy(),
            processing_time_ms: default_processing_time(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl ThresholdsConfig {
    /// Notification cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Outbound alert channels. All optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Slack incoming-webhook URL.
    #[serde(default)]
    pub slack_webhook: Option<String>,

    /// Generic JSON webhook.
    #[serde(default)]
    pub webhook: Option<WebhookTarget>,

    /// Email settings.
    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// Per-channel dispatch timeout in seconds.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
}

fn default_dispatch_timeout() -> u64 {
    10
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            slack_webhook: None,
            webhook: None,
            email: None,
            dispatch_timeout_secs: default_dispatch_timeout(),
        }
    }
}

impl NotificationsConfig {
    /// Per-channel dispatch timeout.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

/// Generic webhook target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub url: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Email alert configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP server.
    pub smtp_server: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// From address.
    pub from: String,
    /// To addresses.
    pub to: Vec<String>,
    /// SMTP username.
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}
