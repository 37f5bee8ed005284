//! Monitoring lifecycle and the periodic evaluation cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use issuewatch_config::{MonitoringConfig, NotificationsConfig};
use issuewatch_protocols::{Credential, RepositoryClient};

use crate::alerting::{AlertHistoryFilter, AlertingSystem};
use crate::alerts::{AlertDescriptor, AlertKey, AlertLevel};
use crate::dashboard::{self, DashboardFormat, DashboardSystem, MonitoringStatus};
use crate::error::MonitorError;
use crate::events::{EventBus, MonitorEvent};
use crate::health::{HealthCheckResult, HealthStatus};
use crate::health_checker::HealthCheckSystem;
use crate::metrics::MetricsCollector;
use crate::metrics_summary::TimeRange;
use crate::metrics_types::{ErrorEvent, ErrorSeverity, PerformanceEvent, SystemEvent};

/// Component name used for the orchestrator's own errors and alerts.
pub const SELF_COMPONENT: &str = "monitoring_system";

/// Result of [`MonitoringOrchestrator::test_monitoring`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringTestReport {
    pub passed: bool,
    pub checks: Vec<SubsystemCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemCheck {
    pub subsystem: String,
    pub passed: bool,
    pub message: String,
}

impl SubsystemCheck {
    fn new(subsystem: &str, passed: bool, message: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            passed,
            message: message.into(),
        }
    }
}

/// What [`MonitoringOrchestrator::export_monitoring_data`] includes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringExportOptions {
    /// Trailing window for metrics. Whole retention window when unset.
    #[serde(default)]
    pub hours: Option<u64>,
    /// Include raw metric events.
    #[serde(default)]
    pub include_raw: bool,
    /// Most recent health results to include. All retained when unset.
    #[serde(default)]
    pub health_history_limit: Option<usize>,
}

struct RunningState {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything the cycle task needs, shared with the orchestrator.
struct CycleContext {
    metrics: Arc<MetricsCollector>,
    health: Arc<HealthCheckSystem>,
    alerting: Arc<AlertingSystem>,
    credential: Credential,
    summary_window: Duration,
    cycle_timeout: Duration,
}

/// Owns the monitoring subsystems and drives the periodic cycle.
///
/// Lifecycle is `Stopped -> Running` on [`start`](Self::start) and back on
/// [`stop`](Self::stop). Instances are independent of each other.
pub struct MonitoringOrchestrator {
    config: MonitoringConfig,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsCollector>,
    health: Arc<HealthCheckSystem>,
    alerting: Arc<AlertingSystem>,
    dashboard: DashboardSystem,
    lifecycle: Mutex<Option<RunningState>>,
    running: AtomicBool,
}

impl MonitoringOrchestrator {
    /// Build all subsystems from configuration.
    pub fn new(config: MonitoringConfig, client: Arc<dyn RepositoryClient>) -> Self {
        let bus = Arc::new(EventBus::default());
        let metrics = Arc::new(MetricsCollector::new(
            config.retention(),
            config.max_events,
            bus.clone(),
        ));
        let health = Arc::new(HealthCheckSystem::with_default_probes(
            client,
            metrics.clone(),
            bus.clone(),
            &config,
        ));
        let alerting = Arc::new(AlertingSystem::new(
            config.thresholds.clone(),
            config.alert_history_size,
            bus.clone(),
        ));
        alerting.configure_notifications(&config.notifications);

        let dashboard = DashboardSystem::new(
            health.clone(),
            metrics.clone(),
            alerting.clone(),
            config.summary_window(),
        );

        Self {
            config,
            bus,
            metrics,
            health,
            alerting,
            dashboard,
            lifecycle: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Telemetry ingestion.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn health(&self) -> &Arc<HealthCheckSystem> {
        &self.health
    }

    pub fn alerting(&self) -> &Arc<AlertingSystem> {
        &self.alerting
    }

    /// Subscribe to monitoring notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.bus.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn configure_notifications(&self, config: &NotificationsConfig) {
        self.alerting.configure_notifications(config);
    }

    /// Run one immediate health check, then schedule the periodic cycle.
    ///
    /// Warns and does nothing when already running. Fails with
    /// [`MonitorError::StartupFailure`] when the initial check cannot
    /// complete; the orchestrator then stays stopped.
    pub async fn start(&self, credential: Credential) -> Result<(), MonitorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            warn!("Monitoring is already running");
            return Ok(());
        }
        if credential.is_blank() {
            return Err(MonitorError::StartupFailure(
                "no API credential provided".to_string(),
            ));
        }
        if self.config.interval().is_zero() {
            return Err(MonitorError::StartupFailure(
                "cycle interval must be positive".to_string(),
            ));
        }

        info!(
            "Starting monitoring (interval: {:?}, cooldown: {:?})",
            self.config.interval(),
            self.config.thresholds.cooldown()
        );

        let initial = tokio::time::timeout(
            self.config.cycle_timeout(),
            self.health.run_checks(Some(&credential), false),
        )
        .await
        .map_err(|_| {
            MonitorError::StartupFailure(format!(
                "initial health check did not finish within {:?}",
                self.config.cycle_timeout()
            ))
        })?;

        if self.config.require_healthy_start && initial.is_unhealthy() {
            return Err(MonitorError::StartupFailure(format!(
                "initial health check is unhealthy: {}",
                describe_failures(&initial)
            )));
        }

        self.health.record(initial.clone());
        self.alerting.process_health_alerts(&initial).await;
        self.health.mark_started();
        self.track_lifecycle(
            "monitoring_started",
            json!({
                "interval_secs": self.config.interval_secs,
                "initial_health": initial.overall,
            }),
        );

        let cancel = CancellationToken::new();
        let ctx = Arc::new(CycleContext {
            metrics: self.metrics.clone(),
            health: self.health.clone(),
            alerting: self.alerting.clone(),
            credential,
            summary_window: self.config.summary_window(),
            cycle_timeout: self.config.cycle_timeout(),
        });
        // Subscribe before spawning so no notification is missed in between.
        let events = self.bus.subscribe();
        let handle = tokio::spawn(run_loop(ctx, cancel.clone(), self.config.interval(), events));

        *lifecycle = Some(RunningState { cancel, handle });
        self.running.store(true, Ordering::SeqCst);
        info!("Monitoring started, initial health: {}", initial.overall);
        Ok(())
    }

    /// Cancel the scheduled cycle. Idempotent.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(state) = lifecycle.take() else {
            debug!("Monitoring is not running");
            return;
        };

        let uptime = self.health.get_uptime();
        state.cancel.cancel();
        if let Err(e) = state.handle.await {
            warn!("Monitoring loop ended abnormally: {}", e);
        }

        self.running.store(false, Ordering::SeqCst);
        self.health.mark_stopped();
        self.track_lifecycle("monitoring_stopped", json!({ "uptime_secs": uptime.as_secs() }));
        info!("Monitoring stopped after {:?}", uptime);
    }

    fn track_lifecycle(&self, event: &str, details: serde_json::Value) {
        if let Err(e) = self.metrics.track_system(SystemEvent {
            event: event.to_string(),
            details: Some(details),
        }) {
            warn!("Failed to record {}: {}", event, e);
        }
    }

    /// On-demand composite snapshot.
    ///
    /// Runs a fresh full health check without recording it, so repeated
    /// calls leave monitoring state untouched.
    pub async fn get_status(&self, credential: Option<&Credential>) -> MonitoringStatus {
        let health = self.health.run_checks(credential, false).await;
        self.dashboard.snapshot(Some(health), self.is_running())
    }

    /// Render the dashboard in `format`.
    pub async fn get_dashboard(&self, credential: Option<&Credential>, format: DashboardFormat) -> String {
        dashboard::render(&self.get_status(credential).await, format)
    }

    /// Exercise each subsystem once.
    ///
    /// Alerting is tested on a scratch instance so no operator is notified.
    pub async fn test_monitoring(&self, credential: Option<&Credential>) -> MonitoringTestReport {
        let mut checks = Vec::with_capacity(4);

        let recorded = self.metrics.track_system(SystemEvent {
            event: "monitoring_test".to_string(),
            details: None,
        });
        let seen = self
            .metrics
            .summary_for_last(Duration::from_secs(60))
            .system
            .by_event
            .get("monitoring_test")
            .copied()
            .unwrap_or(0);
        checks.push(match recorded {
            Ok(()) if seen > 0 => SubsystemCheck::new("metrics", true, "event recorded and aggregated"),
            Ok(()) => SubsystemCheck::new("metrics", false, "recorded event missing from summary"),
            Err(e) => SubsystemCheck::new("metrics", false, e.to_string()),
        });

        let health = self.health.run_checks(credential, false).await;
        checks.push(SubsystemCheck::new(
            "health",
            health.overall != HealthStatus::Unhealthy,
            format!("overall {} ({} components)", health.overall, health.components.len()),
        ));

        let scratch = AlertingSystem::new(
            self.config.thresholds.clone(),
            10,
            Arc::new(EventBus::new(8)),
        );
        let key = AlertKey::new(SELF_COMPONENT, "selfTest");
        scratch
            .trigger_alert(AlertDescriptor::new(
                SELF_COMPONENT,
                "selfTest",
                AlertLevel::Warning,
                "monitoring self-test",
            ))
            .await;
        let resolved = scratch.resolve_alert(&key).await.is_some();
        let stats = scratch.get_alert_stats(&AlertHistoryFilter::default());
        checks.push(SubsystemCheck::new(
            "alerting",
            resolved && stats.total == 1 && stats.resolved == 1,
            format!("{} alert(s), {} resolved", stats.total, stats.resolved),
        ));

        let snapshot = self.dashboard.snapshot(Some(health), self.is_running());
        let rendered_json = dashboard::render(&snapshot, DashboardFormat::Json);
        let rendered_ok = serde_json::from_str::<serde_json::Value>(&rendered_json).is_ok()
            && !dashboard::render(&snapshot, DashboardFormat::Markdown).is_empty()
            && !dashboard::render(&snapshot, DashboardFormat::Text).is_empty();
        checks.push(SubsystemCheck::new(
            "dashboard",
            rendered_ok,
            if rendered_ok { "all formats rendered" } else { "render failed" },
        ));

        let passed = checks.iter().all(|c| c.passed);
        if passed {
            info!("Monitoring self-test passed");
        } else {
            warn!("Monitoring self-test failed: {:?}", checks.iter().filter(|c| !c.passed).collect::<Vec<_>>());
        }
        MonitoringTestReport { passed, checks }
    }

    /// Full JSON dump for external analysis.
    pub fn export_monitoring_data(&self, options: &MonitoringExportOptions) -> Result<String, MonitorError> {
        let time_range = match options.hours {
            Some(hours) => TimeRange::trailing(Duration::from_secs(hours.saturating_mul(3600))),
            None => TimeRange::new(self.metrics.retention_cutoff(), Utc::now()),
        };

        let export = json!({
            "exported_at": Utc::now(),
            "running": self.is_running(),
            "uptime_secs": self.health.get_uptime().as_secs(),
            "health": {
                "current": self.health.current_status(),
                "history": self.health.history(options.health_history_limit),
            },
            "metrics": {
                "summary": self.metrics.get_system_summary(time_range),
                "events": options.include_raw.then(|| self.metrics.events_in(time_range)),
            },
            "alerts": {
                "overview": self.alerting.overview(&AlertHistoryFilter::default()),
                "history": self.alerting.get_alert_history(&AlertHistoryFilter::default()),
            },
            "counters": {
                "health_checks": self.health.check_count(),
                "unhealthy_checks": self.health.failure_count(),
                "events_recorded": self.metrics.get_total_event_count(),
                "events_rejected": self.metrics.rejected_event_count(),
                "events_stored": self.metrics.stored_event_count(),
            },
        });

        serde_json::to_string_pretty(&export).map_err(|e| MonitorError::Export(e.to_string()))
    }
}

fn describe_failures(result: &HealthCheckResult) -> String {
    result
        .alerts
        .iter()
        .map(|a| format!("{}: {}", a.component, a.message))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn run_loop(
    ctx: Arc<CycleContext>,
    cancel: CancellationToken,
    interval: Duration,
    mut events: broadcast::Receiver<MonitorEvent>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => ctx.run_guarded_cycle(&cancel).await,
            event = events.recv() => match event {
                Ok(MonitorEvent::ErrorOccurred { error, .. })
                    if error.severity == ErrorSeverity::Critical =>
                {
                    ctx.alerting.process_critical_error(&error).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Monitoring loop missed {} notifications", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("Monitoring loop exited");
}

impl CycleContext {
    /// Run one cycle in its own task under the cycle timeout.
    async fn run_guarded_cycle(self: &Arc<Self>, cancel: &CancellationToken) {
        let ctx = self.clone();
        let token = cancel.clone();
        let mut handle = tokio::spawn(async move { ctx.run_cycle(&token).await });

        let failure = tokio::select! {
            // Stop waits for the aborted cycle so no state lands after it returns.
            _ = cancel.cancelled() => {
                handle.abort();
                let _ = handle.await;
                debug!("Monitoring stopped mid-cycle, cycle aborted");
                return;
            }
            outcome = tokio::time::timeout(self.cycle_timeout, &mut handle) => match outcome {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(e.to_string()),
                Ok(Err(join_error)) if join_error.is_panic() => Some("cycle panicked".to_string()),
                Ok(Err(join_error)) => Some(join_error.to_string()),
                Err(_) => {
                    handle.abort();
                    Some(format!("cycle exceeded {:?}", self.cycle_timeout))
                }
            },
        };

        let key = AlertKey::new(SELF_COMPONENT, "cycle");
        match failure {
            Some(reason) if !cancel.is_cancelled() => self.report_failure(reason).await,
            Some(_) => {}
            None => {
                self.alerting.resolve_alert(&key).await;
            }
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        let start = Instant::now();

        let health = self.health.run_checks(Some(&self.credential), false).await;
        if cancel.is_cancelled() {
            debug!("Monitoring stopped during health check, discarding result");
            return Ok(());
        }
        self.health.record(health.clone());
        self.alerting.process_health_alerts(&health).await;

        if cancel.is_cancelled() {
            return Ok(());
        }
        let summary = self.metrics.summary_for_last(self.summary_window);
        self.alerting.process_metrics_alerts(&summary).await;

        if cancel.is_cancelled() {
            return Ok(());
        }
        let purged = self.metrics.purge_expired();
        let elapsed = start.elapsed();
        self.metrics.track_performance(PerformanceEvent {
            operation: "monitoring_cycle".to_string(),
            duration_ms: elapsed.as_millis() as u64,
            success: true,
            metadata: Some(json!({
                "overall": health.overall,
                "active_alerts": self.alerting.active_count(),
                "purged_events": purged,
            })),
        })?;

        debug!("Monitoring cycle completed in {:?}: {}", elapsed, health.overall);
        Ok(())
    }

    async fn report_failure(&self, reason: String) {
        error!("Monitoring cycle failed: {}", reason);
        let err = MonitorError::CycleFailure(reason.clone());
        if let Err(e) = self.metrics.track_error(ErrorEvent {
            component: SELF_COMPONENT.to_string(),
            error_type: "CycleFailure".to_string(),
            message: err.to_string(),
            severity: ErrorSeverity::High,
        }) {
            warn!("Failed to record cycle failure: {}", e);
        }

        self.alerting
            .trigger_alert(AlertDescriptor::new(
                SELF_COMPONENT,
                "cycle",
                AlertLevel::Critical,
                err.to_string(),
            ))
            .await;
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
