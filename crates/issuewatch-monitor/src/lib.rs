//! # IssueWatch Monitor
//!
//! Operational monitoring for the issue auto-labeling service.
//!
//! ## Features
//!
//! - Telemetry ingestion with windowed aggregation and export
//! - Concurrent component health probes with per-probe timeouts
//! - Threshold alerting with deduplication, cooldown and resolution
//! - Dashboard rendering (markdown, JSON, plain text)
//! - A periodic evaluation cycle with clean start/stop
//!
//! ## Usage
//!
//! ```rust,ignore
//! use issuewatch_monitor::MonitoringOrchestrator;
//!
//! let monitor = MonitoringOrchestrator::new(config, client);
//! monitor.start(credential).await?;
//! let status = monitor.get_status(None).await;
//! monitor.stop().await;
//! ```

pub mod error;
pub mod events;
pub mod metrics_types;
pub mod metrics_summary;
pub mod metrics;
pub mod health;
pub mod probes;
pub mod health_checker;
pub mod alerts;
pub mod alert_channels;
pub mod alert_manager;
pub mod alerting;
pub mod dashboard;
pub mod orchestrator;

pub use error::MonitorError;
pub use events::{EventBus, MonitorEvent};
pub use metrics_types::{
    ApiUsageEvent, AutoLabelingEvent, ErrorEvent, ErrorSeverity, MetricCategory, MetricEvent,
    MetricPayload, PerformanceEvent, SystemEvent, UserEngagementEvent,
};
pub use metrics_summary::{SystemSummary, TimeRange};
pub use metrics::{ExportFormat, ExportOptions, MetricsCollector};
pub use health::{ComponentHealth, HealthCheckResult, HealthStatus};
pub use probes::{HealthProbe, ProbeContext};
pub use health_checker::HealthCheckSystem;
pub use alerts::{
    Alert, AlertChannel, AlertDescriptor, AlertKey, AlertLevel, LogChannel, Notification,
    NotificationKind,
};
pub use alert_channels::{EmailChannel, SlackChannel, WebhookChannel};
pub use alert_manager::AlertManager;
pub use alerting::{
    AlertHistoryFilter, AlertStats, AlertingSystem, AlertsOverview, TriggerOutcome,
};
pub use dashboard::{DashboardFormat, DashboardSystem, MonitoringStatus};
pub use orchestrator::{
    MonitoringExportOptions, MonitoringOrchestrator, MonitoringTestReport, SubsystemCheck,
};
