//! Alert manager for dispatching notifications to channels.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use issuewatch_config::NotificationsConfig;

use crate::error::MonitorError;

use super::alert_channels::{EmailChannel, SlackChannel, WebhookChannel};
use super::alerts::{AlertChannel, LogChannel, Notification};

/// Fans a notification out to every configured channel.
///
/// Each channel is bounded by the dispatch timeout. Failures are logged and
/// returned for inspection; they never propagate into alert state.
pub struct AlertManager {
    channels: Vec<Arc<dyn AlertChannel>>,
    dispatch_timeout: Duration,
}

impl AlertManager {
    /// Manager with only the log channel.
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self {
            channels: vec![Arc::new(LogChannel)],
            dispatch_timeout,
        }
    }

    /// Create from config.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let mut manager = Self::new(config.dispatch_timeout());

        if let Some(ref webhook_url) = config.slack_webhook {
            if !webhook_url.is_empty() {
                info!("Adding Slack alert channel");
                manager.add_channel(Arc::new(SlackChannel::new(webhook_url)));
            }
        }

        if let Some(ref target) = config.webhook {
            if !target.url.is_empty() {
                info!("Adding webhook alert channel");
                manager.add_channel(Arc::new(WebhookChannel::new(
                    &target.url,
                    target.headers.clone(),
                )));
            }
        }

        if let Some(ref email_config) = config.email {
            info!("Adding Email alert channel");
            manager.add_channel(Arc::new(EmailChannel::new(email_config.clone())));
        }

        manager
    }

    /// Add a channel.
    pub fn add_channel(&mut self, channel: Arc<dyn AlertChannel>) {
        self.channels.push(channel);
    }

    /// Get list of channel names.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send to all channels concurrently.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<MonitorError> {
        let sends = self.channels.iter().map(|channel| async move {
            match tokio::time::timeout(self.dispatch_timeout, channel.send(notification)).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::dispatch(
                    channel.name(),
                    format!("timed out after {:?}", self.dispatch_timeout),
                )),
            }
        });

        let mut errors = Vec::new();
        for result in futures::future::join_all(sends).await {
            if let Err(e) = result {
                error!("Failed to dispatch notification: {}", e);
                errors.push(e);
            }
        }
        errors
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::from_config(&NotificationsConfig::default())
    }
}
