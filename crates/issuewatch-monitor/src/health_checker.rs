//! Health checking across all registered probes.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use issuewatch_config::MonitoringConfig;
use issuewatch_protocols::{Credential, RepositoryClient};

use crate::error::MonitorError;
use crate::events::{EventBus, MonitorEvent};
use crate::health::{ComponentHealth, HealthCheckResult, HealthMetricsSnapshot, HealthStatus};
use crate::metrics::MetricsCollector;
use crate::probes::{
    ApiPerformanceProbe, AuthenticationProbe, AutoLabelingProbe, GitHubApiProbe, HealthProbe,
    ProbeContext,
};

/// Window used for the metrics snapshot attached to each result.
const SNAPSHOT_WINDOW: Duration = Duration::from_secs(3600);

/// Runs probes and keeps a bounded history of results.
pub struct HealthCheckSystem {
    probes: Vec<Arc<dyn HealthProbe>>,
    metrics: Arc<MetricsCollector>,
    bus: Arc<EventBus>,
    probe_timeout: Duration,
    history: RwLock<VecDeque<HealthCheckResult>>,
    history_size: usize,
    started_at: RwLock<Option<Instant>>,
    check_count: AtomicU64,
    failure_count: AtomicU64,
}

impl HealthCheckSystem {
    /// Create a checker with no probes.
    pub fn new(
        metrics: Arc<MetricsCollector>,
        bus: Arc<EventBus>,
        probe_timeout: Duration,
        history_size: usize,
    ) -> Self {
        Self {
            probes: Vec::new(),
            metrics,
            bus,
            probe_timeout,
            history: RwLock::new(VecDeque::new()),
            history_size: history_size.max(1),
            started_at: RwLock::new(None),
            check_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    /// Create a checker with the built-in probes.
    pub fn with_default_probes(
        client: Arc<dyn RepositoryClient>,
        metrics: Arc<MetricsCollector>,
        bus: Arc<EventBus>,
        config: &MonitoringConfig,
    ) -> Self {
        let thresholds = &config.thresholds;
        let window = config.summary_window();

        let mut system = Self::new(
            metrics.clone(),
            bus,
            config.probe_timeout(),
            config.health_history_size,
        );
        system.register(Arc::new(GitHubApiProbe::new(client.clone(), thresholds.rate_limit)));
        system.register(Arc::new(AuthenticationProbe::new(client)));
        system.register(Arc::new(AutoLabelingProbe::new(
            metrics.clone(),
            thresholds.clone(),
            window,
        )));
        system.register(Arc::new(ApiPerformanceProbe::new(
            metrics,
            thresholds.clone(),
            window,
        )));
        system
    }

    /// Register a probe.
    pub fn register(&mut self, probe: Arc<dyn HealthProbe>) {
        debug!("Registered health probe: {}", probe.name());
        self.probes.push(probe);
    }

    /// Run every probe and record the result.
    pub async fn perform_health_check(&self, credential: Option<&Credential>) -> HealthCheckResult {
        let result = self.run_checks(credential, false).await;
        self.record(result.clone());
        result
    }

    /// Run the quick probes only and record the result.
    pub async fn get_quick_health(&self, credential: Option<&Credential>) -> HealthCheckResult {
        let result = self.run_checks(credential, true).await;
        self.record(result.clone());
        result
    }

    /// Run probes without touching history.
    ///
    /// Probes run concurrently, each bounded by the probe timeout. A failing,
    /// timed-out or panicking probe marks only its own component unhealthy.
    pub async fn run_checks(&self, credential: Option<&Credential>, quick: bool) -> HealthCheckResult {
        let start = Instant::now();
        let ctx = ProbeContext::new(credential);

        let selected: Vec<_> = self
            .probes
            .iter()
            .filter(|p| !quick || p.quick())
            .collect();

        let checks = selected.iter().map(|probe| {
            let ctx = &ctx;
            async move {
                let probe_start = Instant::now();
                let guarded = tokio::time::timeout(self.probe_timeout, probe.probe(ctx));
                let outcome = match AssertUnwindSafe(guarded).catch_unwind().await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(MonitorError::ProbeTimeout {
                        component: probe.name().to_string(),
                        timeout: self.probe_timeout,
                    }),
                    Err(panic) => Err(MonitorError::ProbeFailure {
                        component: probe.name().to_string(),
                        reason: format!("panicked: {}", panic_message(panic.as_ref())),
                    }),
                };
                let elapsed_ms = probe_start.elapsed().as_millis() as u64;

                let mut health = outcome.unwrap_or_else(|e| {
                    warn!("Health probe {} failed: {}", probe.name(), e);
                    ComponentHealth::unhealthy(e.to_string())
                });
                health.response_time_ms = elapsed_ms;
                debug!("Health probe {}: {}", probe.name(), health.status);
                (probe.name().to_string(), health)
            }
        });

        let components: BTreeMap<String, ComponentHealth> =
            futures::future::join_all(checks).await.into_iter().collect();

        let summary = self.metrics.summary_for_last(SNAPSHOT_WINDOW);
        let snapshot = HealthMetricsSnapshot {
            total_events: summary.total_events,
            error_rate: summary.errors.error_rate,
            api_success_rate: summary.api_usage.success_rate,
            average_accuracy: summary.auto_labeling.average_accuracy,
        };

        let elapsed = start.elapsed();
        let result = HealthCheckResult::new(components, snapshot, elapsed.as_millis() as u64, quick);
        debug!("Health check completed in {:?}: {}", elapsed, result.overall);
        result
    }

    /// Append a result to history and announce it.
    pub fn record(&self, result: HealthCheckResult) {
        self.check_count.fetch_add(1, Ordering::Relaxed);
        if result.is_unhealthy() {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            warn!("Health check reported unhealthy components");
        }

        let event = MonitorEvent::HealthChecked {
            overall: result.overall,
            quick: result.quick,
        };
        {
            let mut history = self.history.write();
            history.push_back(result);
            while history.len() > self.history_size {
                history.pop_front();
            }
        }
        self.bus.publish(event);
    }

    /// Most recent result.
    pub fn latest(&self) -> Option<HealthCheckResult> {
        self.history.read().back().cloned()
    }

    /// Overall status of the latest result, `Unknown` before any check.
    pub fn current_status(&self) -> HealthStatus {
        self.latest()
            .map(|r| r.overall)
            .unwrap_or(HealthStatus::Unknown)
    }

    /// Up to `limit` most recent results, oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<HealthCheckResult> {
        let history = self.history.read();
        let skip = limit.map_or(0, |l| history.len().saturating_sub(l));
        history.iter().skip(skip).cloned().collect()
    }

    pub fn check_count(&self) -> u64 {
        self.check_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Reset the uptime clock.
    pub fn mark_started(&self) {
        *self.started_at.write() = Some(Instant::now());
        info!("Health uptime clock started");
    }

    pub fn mark_stopped(&self) {
        *self.started_at.write() = None;
    }

    /// Time since the last successful start, zero when stopped.
    pub fn get_uptime(&self) -> Duration {
        self.started_at
            .read()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
