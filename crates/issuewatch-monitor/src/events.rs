//! In-process notification bus backed by a `tokio::sync::broadcast` channel.
//!
//! The collector publishes error notifications, the alerting system
//! publishes alert lifecycle changes, and the health system announces each
//! completed check. Loggers, dashboards and notifiers subscribe
//! independently and unsubscribe by dropping their receiver.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::alerts::Alert;
use crate::health::HealthStatus;
use crate::metrics_types::ErrorEvent;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A monitoring notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// An error was tracked by the metrics collector.
    ErrorOccurred {
        timestamp: DateTime<Utc>,
        error: ErrorEvent,
    },
    /// An alert was created, or refreshed past its cooldown.
    AlertTriggered { alert: Alert, refreshed: bool },
    /// An active alert was resolved.
    AlertResolved { alert: Alert },
    /// A health check finished.
    HealthChecked { overall: HealthStatus, quick: bool },
}

impl MonitorEvent {
    /// Short event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::ErrorOccurred { .. } => "error_occurred",
            MonitorEvent::AlertTriggered { .. } => "alert_triggered",
            MonitorEvent::AlertResolved { .. } => "alert_resolved",
            MonitorEvent::HealthChecked { .. } => "health_checked",
        }
    }
}

/// Fan-out event bus shared via `Arc<EventBus>`.
///
/// When the buffer is full the oldest undelivered events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers.
    pub fn publish(&self, event: MonitorEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
