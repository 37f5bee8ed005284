//! Alert types and the notification channel trait.

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::MonitorError;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl AlertLevel {
    /// Get emoji for level.
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "\u{26a0}\u{fe0f}",
            AlertLevel::Critical => "\u{1f6a8}",
        }
    }

    /// Get color for Slack attachments.
    pub fn color(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "#f0ad4e",
            AlertLevel::Critical => "#d9534f",
        }
    }
}

/// Deduplication key: at most one active alert per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub component: String,
    pub metric: String,
}

impl AlertKey {
    pub fn new(component: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            metric: metric.into(),
        }
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.component, self.metric)
    }
}

/// A threshold breach to raise or refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDescriptor {
    pub key: AlertKey,
    pub level: AlertLevel,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

impl AlertDescriptor {
    pub fn new(
        component: impl Into<String>,
        metric: impl Into<String>,
        level: AlertLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: AlertKey::new(component, metric),
            level,
            message: message.into(),
            value: None,
            threshold: None,
        }
    }

    /// Attach the observed value and the threshold it crossed.
    pub fn with_measurement(mut self, value: f64, threshold: f64) -> Self {
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }
}

/// An alert, active or resolved.
///
/// Resolved alerts live in history and are never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub level: AlertLevel,
    pub component: String,
    pub metric: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub active: bool,
    /// Breaches observed while active, including the first.
    pub occurrences: u32,
    pub notifications_sent: u32,
}

impl Alert {
    /// Create an active alert from a descriptor.
    pub fn from_descriptor(descriptor: &AlertDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level: descriptor.level,
            component: descriptor.key.component.clone(),
            metric: descriptor.key.metric.clone(),
            message: descriptor.message.clone(),
            value: descriptor.value,
            threshold: descriptor.threshold,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            active: true,
            occurrences: 1,
            notifications_sent: 0,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.component.clone(), self.metric.clone())
    }

    /// Apply a repeat breach to an active alert.
    pub(crate) fn refresh(&mut self, descriptor: &AlertDescriptor, now: DateTime<Utc>) {
        self.level = descriptor.level;
        self.message = descriptor.message.clone();
        self.value = descriptor.value;
        self.threshold = descriptor.threshold;
        self.updated_at = now;
        self.occurrences += 1;
    }

    pub(crate) fn resolve(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.resolved_at = Some(now);
        self.updated_at = now;
    }

    /// Format for text output.
    pub fn format_text(&self) -> String {
        let mut text = format!(
            "[{}] {} - {}/{}\n{}",
            self.level,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.component,
            self.metric,
            self.message
        );

        if let (Some(value), Some(threshold)) = (self.value, self.threshold) {
            text.push_str(&format!("\nValue: {:.4} (threshold {:.4})", value, threshold));
        }

        text
    }

    /// Format for Markdown output.
    pub fn format_markdown(&self) -> String {
        format!(
            "{} **{}** `{}/{}` - {}",
            self.level.emoji(),
            self.level,
            self.component,
            self.metric,
            self.message
        )
    }
}

/// What happened to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Triggered,
    Resolved,
}

/// A message handed to outbound channels.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub alert: Alert,
}

impl Notification {
    pub fn triggered(alert: Alert) -> Self {
        Self {
            kind: NotificationKind::Triggered,
            alert,
        }
    }

    pub fn resolved(alert: Alert) -> Self {
        Self {
            kind: NotificationKind::Resolved,
            alert,
        }
    }

    /// One-line title.
    pub fn title(&self) -> String {
        match self.kind {
            NotificationKind::Triggered => format!(
                "{} {} alert: {}",
                self.alert.level.emoji(),
                self.alert.level,
                self.alert.key()
            ),
            NotificationKind::Resolved => format!("\u{2705} Resolved: {}", self.alert.key()),
        }
    }
}

/// Outbound notification channel.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name.
    fn name(&self) -> &str;

    /// Deliver a notification.
    async fn send(&self, notification: &Notification) -> Result<(), MonitorError>;
}

/// Log channel (writes to tracing).
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), MonitorError> {
        let alert = &notification.alert;
        match (notification.kind, alert.level) {
            (NotificationKind::Resolved, _) => {
                info!("[ALERT RESOLVED] {}: {}", alert.key(), alert.message)
            }
            (NotificationKind::Triggered, AlertLevel::Warning) => {
                warn!("[ALERT] {}: {}", alert.key(), alert.message)
            }
            (NotificationKind::Triggered, AlertLevel::Critical) => {
                error!("[ALERT] {}: {}", alert.key(), alert.message)
            }
        }
        Ok(())
    }
}
