//! Pull-based dashboard rendering.
//!
//! Each section of a [`MonitoringStatus`] is optional. A missing section
//! renders as "unknown" so the dashboard stays usable during partial
//! outages. Rendering never fails.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerting::{AlertHistoryFilter, AlertingSystem, AlertsOverview};
use crate::alerts::AlertLevel;
use crate::health::{HealthCheckResult, HealthStatus};
use crate::health_checker::HealthCheckSystem;
use crate::metrics::MetricsCollector;
use crate::metrics_summary::SystemSummary;

/// Dashboard output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardFormat {
    /// Rich Markdown document.
    #[default]
    Markdown,
    /// Structured data mirroring [`MonitoringStatus`].
    Json,
    /// Condensed text for terminals and logs.
    Text,
}

impl FromStr for DashboardFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(DashboardFormat::Markdown),
            "json" => Ok(DashboardFormat::Json),
            "text" | "txt" => Ok(DashboardFormat::Text),
            other => Err(format!("unknown dashboard format: {}", other)),
        }
    }
}

impl std::fmt::Display for DashboardFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DashboardFormat::Markdown => write!(f, "markdown"),
            DashboardFormat::Json => write!(f, "json"),
            DashboardFormat::Text => write!(f, "text"),
        }
    }
}

/// Point-in-time composite snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub timestamp: DateTime<Utc>,
    pub running: bool,
    pub uptime_secs: u64,
    pub health: Option<HealthCheckResult>,
    pub metrics: Option<SystemSummary>,
    pub alerts: Option<AlertsOverview>,
}

impl MonitoringStatus {
    /// Snapshot with every section unknown.
    pub fn unknown(running: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            running,
            uptime_secs: 0,
            health: None,
            metrics: None,
            alerts: None,
        }
    }

    pub fn overall(&self) -> HealthStatus {
        self.health
            .as_ref()
            .map(|h| h.overall)
            .unwrap_or(HealthStatus::Unknown)
    }
}

/// Assembles snapshots from the three subsystems and renders them.
pub struct DashboardSystem {
    health: Arc<HealthCheckSystem>,
    metrics: Arc<MetricsCollector>,
    alerting: Arc<AlertingSystem>,
    window: Duration,
}

impl DashboardSystem {
    pub fn new(
        health: Arc<HealthCheckSystem>,
        metrics: Arc<MetricsCollector>,
        alerting: Arc<AlertingSystem>,
        window: Duration,
    ) -> Self {
        Self {
            health,
            metrics,
            alerting,
            window,
        }
    }

    /// Build a snapshot. Without an explicit `health` result the latest
    /// recorded one is used.
    pub fn snapshot(&self, health: Option<HealthCheckResult>, running: bool) -> MonitoringStatus {
        let health = health.or_else(|| self.health.latest());

        let summary = self.metrics.summary_for_last(self.window);
        let metrics = (summary.total_events > 0).then_some(summary);

        let alerts = self.alerting.overview(&AlertHistoryFilter::default());

        MonitoringStatus {
            timestamp: Utc::now(),
            running,
            uptime_secs: self.health.get_uptime().as_secs(),
            health,
            metrics,
            alerts: Some(alerts),
        }
    }
}

/// Render a snapshot.
pub fn render(status: &MonitoringStatus, format: DashboardFormat) -> String {
    match format {
        DashboardFormat::Markdown => render_markdown(status),
        DashboardFormat::Json => render_json(status),
        DashboardFormat::Text => render_text(status),
    }
}

fn render_json(status: &MonitoringStatus) -> String {
    serde_json::to_string_pretty(status).unwrap_or_else(|e| {
        serde_json::json!({
            "timestamp": status.timestamp,
            "running": status.running,
            "error": format!("failed to serialize dashboard: {}", e),
        })
        .to_string()
    })
}

fn render_markdown(status: &MonitoringStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# IssueWatch Monitoring Dashboard\n");
    let _ = writeln!(
        out,
        "_Generated {}_\n",
        status.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        out,
        "**Monitoring:** {} | **Uptime:** {} | **Health:** {} {}\n",
        if status.running { "running" } else { "stopped" },
        format_duration(status.uptime_secs),
        status.overall().emoji(),
        status.overall()
    );

    out.push_str("## Health\n\n");
    match status.health {
        Some(ref health) if !health.components.is_empty() => {
            out.push_str("| Component | Status | Response | Details |\n");
            out.push_str("|---|---|---|---|\n");
            for (name, c) in &health.components {
                let _ = writeln!(
                    out,
                    "| {} | {} {} | {}ms | {} |",
                    name,
                    c.status.emoji(),
                    c.status,
                    c.response_time_ms,
                    c.message.as_deref().unwrap_or("-")
                );
            }
            let _ = writeln!(
                out,
                "\n_Checked {} in {}ms_\n",
                health.timestamp.format("%H:%M:%S UTC"),
                health.duration_ms
            );
        }
        _ => out.push_str("Health status unknown.\n\n"),
    }

    out.push_str("## Metrics\n\n");
    match status.metrics {
        Some(ref m) => {
            let _ = writeln!(
                out,
                "_Window: {} to {} ({} events)_\n",
                m.time_range.start.format("%H:%M"),
                m.time_range.end.format("%H:%M"),
                m.total_events
            );
            let a = &m.auto_labeling;
            let _ = writeln!(
                out,
                "- **Auto-labeling:** {} runs, accuracy {}, avg {:.0}ms, component detection {:.1}%, overrides {:.1}%",
                a.total,
                if a.accuracy_samples > 0 {
                    format!("{:.1}%", a.average_accuracy * 100.0)
                } else {
                    "n/a".to_string()
                },
                a.average_processing_time_ms,
                a.component_detection_rate * 100.0,
                a.manual_override_rate * 100.0
            );
            let api = &m.api_usage;
            let _ = writeln!(
                out,
                "- **API:** {} requests, {:.1}% success, avg {:.0}ms, rate limit {}",
                api.total_requests,
                api.success_rate * 100.0,
                api.average_response_time_ms,
                match (api.rate_limit_remaining, api.rate_limit_limit) {
                    (Some(r), Some(l)) => format!("{}/{}", r, l),
                    (Some(r), None) => r.to_string(),
                    _ => "unknown".to_string(),
                }
            );
            let _ = writeln!(
                out,
                "- **Errors:** {} (rate {:.2}%)",
                m.errors.total_errors,
                m.errors.error_rate * 100.0
            );
            let p = &m.performance;
            let _ = writeln!(
                out,
                "- **Performance:** {} operations, avg {:.0}ms{}",
                p.total_operations,
                p.average_duration_ms,
                p.slowest_operation
                    .as_deref()
                    .map(|op| format!(", slowest `{}` ({}ms)", op, p.slowest_duration_ms))
                    .unwrap_or_default()
            );
            let _ = writeln!(
                out,
                "- **Engagement:** {} actions by {} users\n",
                m.user_engagement.total_actions, m.user_engagement.unique_users
            );
        }
        None => out.push_str("No telemetry in the current window.\n\n"),
    }

    out.push_str("## Alerts\n\n");
    match status.alerts {
        Some(ref alerts) => {
            if alerts.active.is_empty() {
                out.push_str("_No active alerts_\n");
            } else {
                for alert in &alerts.active {
                    let _ = writeln!(out, "- {}", alert.format_markdown());
                }
            }
            let _ = writeln!(
                out,
                "\n{} total, {} active, {} resolved",
                alerts.stats.total, alerts.stats.active, alerts.stats.resolved
            );
        }
        None => out.push_str("Alert status unknown.\n"),
    }

    out
}

fn render_text(status: &MonitoringStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "IssueWatch [{}, up {}] health={}",
        if status.running { "running" } else { "stopped" },
        format_duration(status.uptime_secs),
        status.overall()
    );

    if let Some(ref health) = status.health {
        let degraded: Vec<String> = health
            .components
            .iter()
            .filter(|(_, c)| c.status != HealthStatus::Healthy)
            .map(|(name, c)| format!("{}={}", name, c.status))
            .collect();
        if !degraded.is_empty() {
            let _ = writeln!(out, "  components: {}", degraded.join(" "));
        }
    }

    match status.metrics {
        Some(ref m) => {
            let _ = writeln!(
                out,
                "metrics: events={} api={}/{:.1}% avg={:.0}ms errors={} rate={:.2}% labeling={}",
                m.total_events,
                m.api_usage.total_requests,
                m.api_usage.success_rate * 100.0,
                m.api_usage.average_response_time_ms,
                m.errors.total_errors,
                m.errors.error_rate * 100.0,
                m.auto_labeling.total
            );
        }
        None => out.push_str("metrics: unknown\n"),
    }

    match status.alerts {
        Some(ref alerts) => {
            let critical = alerts
                .active
                .iter()
                .filter(|a| a.level == AlertLevel::Critical)
                .count();
            let _ = writeln!(
                out,
                "alerts: {} active ({} critical)",
                alerts.active.len(),
                critical
            );
            for alert in &alerts.active {
                let _ = writeln!(out, "  [{}] {}: {}", alert.level, alert.key(), alert.message);
            }
        }
        None => out.push_str("alerts: unknown\n"),
    }

    out
}

/// `1h 2m`, `3d 4h`, `45s`.
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}s", secs),
        (0, 0, m) => format!("{}m {}s", m, secs % 60),
        (0, h, m) => format!("{}h {}m", h, m),
        (d, h, _) => format!("{}d {}h", d, h),
    }
}
