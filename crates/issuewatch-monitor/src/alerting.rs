//! Alert lifecycle: threshold evaluation, deduplication, cooldown and
//! resolution.
//!
//! State transitions per `(component, metric)` key:
//!
//! - none -> active: first breach, notification dispatched
//! - active -> active: repeat breach, notification only past cooldown
//! - active -> resolved: condition cleared, resolution dispatched once
//!
//! The cooldown window is closed-open. A notification at `t0` suppresses
//! notifications for the same key during `[t0, t0 + cooldown)`.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use issuewatch_config::{NotificationsConfig, ThresholdsConfig};

use crate::alert_manager::AlertManager;
use crate::alerts::{Alert, AlertDescriptor, AlertKey, AlertLevel, Notification};
use crate::events::{EventBus, MonitorEvent};
use crate::health::{HealthCheckResult, HealthStatus};
use crate::metrics_summary::SystemSummary;
use crate::metrics_types::ErrorEvent;

/// Metric name used for component health alerts.
pub const STATUS_METRIC: &str = "status";

/// Metric name used for alerts raised by a reported critical error.
pub const CRITICAL_ERROR_METRIC: &str = "criticalError";

/// Filter for [`AlertingSystem::get_alert_history`] and
/// [`AlertingSystem::get_alert_stats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertHistoryFilter {
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub level: Option<AlertLevel>,
    /// Only alerts created at or after this time.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` alerts.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AlertHistoryFilter {
    fn matches(&self, alert: &Alert) -> bool {
        self.component
            .as_deref()
            .is_none_or(|c| c == alert.component)
            && self.level.is_none_or(|l| l == alert.level)
            && self.since.is_none_or(|s| alert.created_at >= s)
    }
}

/// Alert counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub by_level: BTreeMap<AlertLevel, usize>,
    pub by_component: BTreeMap<String, usize>,
}

/// Active alerts plus counts, read together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsOverview {
    pub active: Vec<Alert>,
    pub stats: AlertStats,
}

/// What a call to `trigger_alert` did.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// New alert created and notified.
    Created(Alert),
    /// Existing alert refreshed; notified because cooldown had elapsed.
    Renotified(Alert),
    /// New or existing alert recorded, notification suppressed by cooldown.
    Suppressed(Alert),
}

impl TriggerOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            TriggerOutcome::Created(a)
            | TriggerOutcome::Renotified(a)
            | TriggerOutcome::Suppressed(a) => a,
        }
    }

    pub fn notified(&self) -> bool {
        !matches!(self, TriggerOutcome::Suppressed(_))
    }
}

#[derive(Default)]
struct AlertState {
    active: HashMap<AlertKey, Alert>,
    history: VecDeque<Alert>,
    // Survives resolution so a flapping condition stays rate-limited.
    last_notified: HashMap<AlertKey, DateTime<Utc>>,
}

impl AlertState {
    fn active_sorted(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.active.values().cloned().collect();
        alerts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        alerts
    }

    fn stats(&self, filter: &AlertHistoryFilter) -> AlertStats {
        let mut stats = AlertStats::default();
        let all = self
            .active
            .values()
            .chain(self.history.iter())
            .filter(|a| filter.matches(a));
        for alert in all {
            stats.total += 1;
            if alert.active {
                stats.active += 1;
            } else {
                stats.resolved += 1;
            }
            *stats.by_level.entry(alert.level).or_default() += 1;
            *stats.by_component.entry(alert.component.clone()).or_default() += 1;
        }
        stats
    }
}

/// Evaluates health and metrics against thresholds and owns alert state.
pub struct AlertingSystem {
    thresholds: ThresholdsConfig,
    state: Mutex<AlertState>,
    history_size: usize,
    manager: RwLock<Arc<AlertManager>>,
    bus: Arc<EventBus>,
}

impl AlertingSystem {
    pub fn new(thresholds: ThresholdsConfig, history_size: usize, bus: Arc<EventBus>) -> Self {
        Self {
            thresholds,
            state: Mutex::new(AlertState::default()),
            history_size: history_size.max(1),
            manager: RwLock::new(Arc::new(AlertManager::default())),
            bus,
        }
    }

    pub fn thresholds(&self) -> &ThresholdsConfig {
        &self.thresholds
    }

    /// End of the cooldown window opened by a notification at `last`.
    fn cooldown_until(&self, last: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.thresholds.cooldown())
            .ok()
            .and_then(|cooldown| last.checked_add_signed(cooldown))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Replace the outbound channels.
    pub fn configure_notifications(&self, config: &NotificationsConfig) {
        let manager = AlertManager::from_config(config);
        info!("Notification channels: {:?}", manager.channel_names());
        *self.manager.write() = Arc::new(manager);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.manager
            .read()
            .channel_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Raise or refresh the alert for `descriptor.key`.
    pub async fn trigger_alert(&self, descriptor: AlertDescriptor) -> TriggerOutcome {
        self.trigger_alert_at(descriptor, Utc::now()).await
    }

    pub(crate) async fn trigger_alert_at(
        &self,
        descriptor: AlertDescriptor,
        now: DateTime<Utc>,
    ) -> TriggerOutcome {
        let outcome = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let active = &state.active;
            state
                .last_notified
                .retain(|key, last| active.contains_key(key) || now < self.cooldown_until(*last));

            let cooling = state
                .last_notified
                .get(&descriptor.key)
                .is_some_and(|last| now < self.cooldown_until(*last));

            let created = !state.active.contains_key(&descriptor.key);
            let alert = state
                .active
                .entry(descriptor.key.clone())
                .and_modify(|existing| existing.refresh(&descriptor, now))
                .or_insert_with(|| Alert::from_descriptor(&descriptor, now));

            if cooling {
                TriggerOutcome::Suppressed(alert.clone())
            } else {
                alert.notifications_sent += 1;
                let snapshot = alert.clone();
                state.last_notified.insert(descriptor.key.clone(), now);
                if created {
                    TriggerOutcome::Created(snapshot)
                } else {
                    TriggerOutcome::Renotified(snapshot)
                }
            }
        };

        match &outcome {
            TriggerOutcome::Suppressed(alert) => {
                debug!("Alert {} within cooldown, notification suppressed", alert.key());
            }
            TriggerOutcome::Created(alert) | TriggerOutcome::Renotified(alert) => {
                let refreshed = matches!(outcome, TriggerOutcome::Renotified(_));
                self.bus.publish(MonitorEvent::AlertTriggered {
                    alert: alert.clone(),
                    refreshed,
                });
                self.dispatch(Notification::triggered(alert.clone())).await;
            }
        }
        outcome
    }

    /// Resolve the active alert for `key`, if any.
    ///
    /// Returns the resolved alert. Resolving a key with no active alert is a
    /// no-op, so the resolution notification fires exactly once.
    pub async fn resolve_alert(&self, key: &AlertKey) -> Option<Alert> {
        let resolved = {
            let mut state = self.state.lock();
            let mut alert = state.active.remove(key)?;
            alert.resolve(Utc::now());
            state.history.push_back(alert.clone());
            while state.history.len() > self.history_size {
                state.history.pop_front();
            }
            alert
        };

        info!("Alert {} resolved", key);
        self.bus.publish(MonitorEvent::AlertResolved {
            alert: resolved.clone(),
        });
        self.dispatch(Notification::resolved(resolved.clone())).await;
        Some(resolved)
    }

    async fn dispatch(&self, notification: Notification) {
        let manager = self.manager.read().clone();
        let failures = manager.dispatch(&notification).await;
        if !failures.is_empty() {
            debug!(
                "{} channel(s) failed for {}",
                failures.len(),
                notification.alert.key()
            );
        }
    }

    /// Raise alerts for non-healthy components; resolve recovered ones.
    pub async fn process_health_alerts(&self, health: &HealthCheckResult) -> Vec<TriggerOutcome> {
        let mut outcomes = Vec::new();
        for (component, result) in &health.components {
            let key = AlertKey::new(component.clone(), STATUS_METRIC);
            let level = match result.status {
                HealthStatus::Unhealthy => AlertLevel::Critical,
                HealthStatus::Degraded => AlertLevel::Warning,
                HealthStatus::Healthy => {
                    self.resolve_alert(&key).await;
                    continue;
                }
                HealthStatus::Unknown => continue,
            };

            let message = result
                .message
                .clone()
                .unwrap_or_else(|| format!("{} is {}", component, result.status));
            let descriptor = AlertDescriptor {
                key,
                level,
                message,
                value: None,
                threshold: None,
            };
            outcomes.push(self.trigger_alert(descriptor).await);
        }
        outcomes
    }

    /// Raise the alert for a critical error reported by `error.component`.
    ///
    /// The alert resolves on the first metrics evaluation whose window holds
    /// no critical error for that component.
    pub async fn process_critical_error(&self, error: &ErrorEvent) -> TriggerOutcome {
        self.trigger_alert(AlertDescriptor::new(
            error.component.clone(),
            CRITICAL_ERROR_METRIC,
            AlertLevel::Critical,
            format!("{}: {}", error.error_type, error.message),
        ))
        .await
    }

    /// Compare a metrics summary against the thresholds.
    pub async fn process_metrics_alerts(&self, summary: &SystemSummary) -> Vec<TriggerOutcome> {
        let (breaches, cleared) = self.evaluate_metrics(summary);

        let mut outcomes = Vec::with_capacity(breaches.len());
        for descriptor in breaches {
            outcomes.push(self.trigger_alert(descriptor).await);
        }
        for key in cleared {
            self.resolve_alert(&key).await;
        }
        outcomes
    }

    /// Split the metric rules into breached descriptors and cleared keys.
    fn evaluate_metrics(&self, summary: &SystemSummary) -> (Vec<AlertDescriptor>, Vec<AlertKey>) {
        let t = &self.thresholds;
        let mut breaches = Vec::new();
        let mut checked = HashSet::new();

        let error_rate = summary.errors.error_rate;
        checked.insert(AlertKey::new("errors", "errorRate"));
        if error_rate > t.error_rate {
            let level = if error_rate >= t.error_rate * 2.0 {
                AlertLevel::Critical
            } else {
                AlertLevel::Warning
            };
            breaches.push(
                AlertDescriptor::new(
                    "errors",
                    "errorRate",
                    level,
                    format!(
                        "Error rate {:.2}% exceeds {:.2}%",
                        error_rate * 100.0,
                        t.error_rate * 100.0
                    ),
                )
                .with_measurement(error_rate, t.error_rate),
            );
        }

        let api = &summary.api_usage;
        if api.total_requests > 0 {
            checked.insert(AlertKey::new("api", "responseTime"));
            let threshold = t.response_time_ms as f64;
            if api.average_response_time_ms > threshold {
                breaches.push(
                    AlertDescriptor::new(
                        "api",
                        "responseTime",
                        AlertLevel::Warning,
                        format!(
                            "Average response time {:.0}ms exceeds {}ms",
                            api.average_response_time_ms, t.response_time_ms
                        ),
                    )
                    .with_measurement(api.average_response_time_ms, threshold),
                );
            }
        }

        if let Some(ratio) = api.rate_limit_ratio() {
            checked.insert(AlertKey::new("api", "rateLimit"));
            if ratio < t.rate_limit {
                let level = if api.rate_limit_remaining == Some(0) {
                    AlertLevel::Critical
                } else {
                    AlertLevel::Warning
                };
                breaches.push(
                    AlertDescriptor::new(
                        "api",
                        "rateLimit",
                        level,
                        format!(
                            "Rate limit budget at {:.1}% (minimum {:.1}%)",
                            ratio * 100.0,
                            t.rate_limit * 100.0
                        ),
                    )
                    .with_measurement(ratio, t.rate_limit),
                );
            }
        }

        let labeling = &summary.auto_labeling;
        if labeling.accuracy_samples > 0 {
            checked.insert(AlertKey::new("auto_labeling", "accuracy"));
            if labeling.average_accuracy < t.accuracy {
                breaches.push(
                    AlertDescriptor::new(
                        "auto_labeling",
                        "accuracy",
                        AlertLevel::Warning,
                        format!(
                            "Labeling accuracy {:.1}% below {:.1}%",
                            labeling.average_accuracy * 100.0,
                            t.accuracy * 100.0
                        ),
                    )
                    .with_measurement(labeling.average_accuracy, t.accuracy),
                );
            }
        }

        if labeling.total > 0 {
            checked.insert(AlertKey::new("auto_labeling", "processingTime"));
            let threshold = t.processing_time_ms as f64;
            if labeling.average_processing_time_ms > threshold {
                breaches.push(
                    AlertDescriptor::new(
                        "auto_labeling",
                        "processingTime",
                        AlertLevel::Warning,
                        format!(
                            "Labeling takes {:.0}ms on average (limit {}ms)",
                            labeling.average_processing_time_ms, t.processing_time_ms
                        ),
                    )
                    .with_measurement(labeling.average_processing_time_ms, threshold),
                );
            }
        }

        // Raised after the window closed means the error is not in it yet.
        for alert in self.state.lock().active.values() {
            if alert.metric == CRITICAL_ERROR_METRIC
                && alert.updated_at <= summary.time_range.end
                && !summary.errors.critical_by_component.contains_key(&alert.component)
            {
                checked.insert(alert.key());
            }
        }

        let breached: HashSet<&AlertKey> = breaches.iter().map(|d| &d.key).collect();
        let mut cleared: Vec<AlertKey> = checked
            .iter()
            .filter(|k| !breached.contains(k))
            .cloned()
            .collect();
        cleared.sort();
        (breaches, cleared)
    }

    /// Snapshot of active alerts, most recent first.
    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.state.lock().active_sorted()
    }

    /// Active alerts and the stats matching `filter` from one lock, so
    /// `stats.active` always equals the number of active alerts returned
    /// when the filter is empty.
    pub fn overview(&self, filter: &AlertHistoryFilter) -> AlertsOverview {
        let state = self.state.lock();
        AlertsOverview {
            active: state.active_sorted(),
            stats: state.stats(filter),
        }
    }

    /// Resolved alerts matching `filter`, oldest first.
    pub fn get_alert_history(&self, filter: &AlertHistoryFilter) -> Vec<Alert> {
        let state = self.state.lock();
        let matching: Vec<&Alert> = state.history.iter().filter(|a| filter.matches(a)).collect();
        let skip = filter
            .limit
            .map_or(0, |l| matching.len().saturating_sub(l));
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Counts over active alerts and history matching `filter`.
    pub fn get_alert_stats(&self, filter: &AlertHistoryFilter) -> AlertStats {
        self.state.lock().stats(filter)
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }
}

#[cfg(test)]
#[path = "alerting_tests.rs"]
mod tests;
