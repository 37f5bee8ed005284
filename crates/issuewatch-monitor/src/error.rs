//! Monitor errors.

use std::time::Duration;

use thiserror::Error;

use issuewatch_protocols::ClientError;

/// Monitor error types.
///
/// Only [`MonitorError::StartupFailure`] ever reaches callers of the
/// orchestrator lifecycle; the other variants are isolated to the probe,
/// channel or cycle that produced them.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A health probe could not assess its component.
    #[error("Probe '{component}' failed: {reason}")]
    ProbeFailure { component: String, reason: String },

    /// A health probe exceeded its time budget.
    #[error("Probe '{component}' timed out after {timeout:?}")]
    ProbeTimeout { component: String, timeout: Duration },

    /// An outbound notification channel could not deliver.
    #[error("Notification via {channel} failed: {reason}")]
    NotificationDispatch { channel: String, reason: String },

    /// The scheduled evaluation cycle failed unexpectedly.
    #[error("Monitoring cycle failed: {0}")]
    CycleFailure(String),

    /// The initial health check at start could not complete.
    #[error("Monitoring failed to start: {0}")]
    StartupFailure(String),

    /// A telemetry event was missing or had invalid required fields.
    #[error("Invalid {category} event: {reason}")]
    InvalidEvent { category: String, reason: String },

    /// Export could not be produced.
    #[error("Export failed: {0}")]
    Export(String),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from the hosting API client.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl MonitorError {
    /// Build an [`MonitorError::InvalidEvent`].
    pub fn invalid_event(category: impl Into<String>, reason: impl Into<String>) -> Self {
        MonitorError::InvalidEvent {
            category: category.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`MonitorError::NotificationDispatch`].
    pub fn dispatch(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        MonitorError::NotificationDispatch {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
