//! Alert channel implementations (Slack, generic webhook, email).

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use issuewatch_config::EmailConfig;

use crate::error::MonitorError;

use super::alerts::{AlertChannel, Notification, NotificationKind};

/// Slack incoming-webhook channel.
pub struct SlackChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn payload(notification: &Notification) -> serde_json::Value {
        let alert = &notification.alert;
        let color = match notification.kind {
            NotificationKind::Triggered => alert.level.color(),
            NotificationKind::Resolved => "#36a64f",
        };

        let mut fields = vec![
            serde_json::json!({ "title": "Component", "value": alert.component, "short": true }),
            serde_json::json!({ "title": "Metric", "value": alert.metric, "short": true }),
        ];
        if let (Some(value), Some(threshold)) = (alert.value, alert.threshold) {
            fields.push(serde_json::json!({
                "title": "Value",
                "value": format!("{:.4} (threshold {:.4})", value, threshold),
                "short": false
            }));
        }

        serde_json::json!({
            "attachments": [{
                "color": color,
                "title": notification.title(),
                "text": alert.message,
                "footer": "IssueWatch",
                "ts": alert.updated_at.timestamp(),
                "fields": fields
            }]
        })
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, notification: &Notification) -> Result<(), MonitorError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&Self::payload(notification))
            .send()
            .await
            .map_err(|e| MonitorError::dispatch("slack", format!("request failed: {}", e)))?;

        if response.status().is_success() {
            debug!("Slack notification sent");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(MonitorError::dispatch(
                "slack",
                format!("webhook returned {}: {}", status, body),
            ))
        }
    }
}

/// Generic JSON webhook channel.
///
/// Posts the serialized [`Notification`] as-is.
pub struct WebhookChannel {
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            url: url.into(),
            headers,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), MonitorError> {
        let mut request = self.client.post(&self.url).json(notification);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| MonitorError::dispatch("webhook", format!("request failed: {}", e)))?;

        if response.status().is_success() {
            debug!("Webhook notification sent to {}", self.url);
            Ok(())
        } else {
            Err(MonitorError::dispatch(
                "webhook",
                format!("{} returned {}", self.url, response.status()),
            ))
        }
    }
}

/// Email channel (SMTP settings only).
///
/// Delivery is logged rather than sent; there is no SMTP client in the
/// dependency tree.
pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> Result<(), MonitorError> {
        if self.config.to.is_empty() {
            return Err(MonitorError::dispatch("email", "no recipients configured"));
        }

        warn!(
            "Email channel is using placeholder implementation. \
             '{}' would be sent to {:?} via {}:{}",
            notification.title(),
            self.config.to,
            self.config.smtp_server,
            self.config.smtp_port
        );

        debug!(
            "Email notification details:\n\
             From: {}\n\
             To: {:?}\n\
             Subject: {}\n\
             Body: {}",
            self.config.from,
            self.config.to,
            notification.title(),
            notification.alert.format_text()
        );

        Ok(())
    }
}
