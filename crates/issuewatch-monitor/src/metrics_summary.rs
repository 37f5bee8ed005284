//! Time-windowed aggregates over recorded telemetry.
//!
//! Aggregates are computed on query and never stored. A window with no data
//! yields zeroed aggregates rather than an error.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics_types::{ErrorSeverity, MetricEvent, MetricPayload};

/// Closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `window` leading up to now.
    pub fn trailing(window: Duration) -> Self {
        let end = Utc::now();
        let span = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let start = end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoLabelingSummary {
    pub total: u64,
    /// Events that reported an accuracy value.
    pub accuracy_samples: u64,
    pub average_accuracy: f64,
    pub average_confidence: f64,
    pub average_processing_time_ms: f64,
    pub component_detection_rate: f64,
    pub manual_override_rate: f64,
    pub labels_applied: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    /// Most recent reported rate-limit budget.
    pub rate_limit_remaining: Option<u32>,
    pub rate_limit_limit: Option<u32>,
    pub requests_by_endpoint: BTreeMap<String, u64>,
}

impl ApiUsageSummary {
    /// Remaining fraction of the rate-limit budget, when known.
    pub fn rate_limit_ratio(&self) -> Option<f64> {
        match (self.rate_limit_remaining, self.rate_limit_limit) {
            (Some(remaining), Some(limit)) if limit > 0 => {
                Some((remaining as f64 / limit as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_operations: u64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
    pub slowest_operation: Option<String>,
    pub slowest_duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: u64,
    /// Errors per operation in the window.
    pub error_rate: f64,
    pub by_component: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    /// Critical-severity errors per component.
    #[serde(default)]
    pub critical_by_component: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEngagementSummary {
    pub total_actions: u64,
    pub unique_users: u64,
    pub by_action: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemEventSummary {
    pub total_events: u64,
    pub by_event: BTreeMap<String, u64>,
}

/// Per-category aggregates for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub time_range: TimeRange,
    pub total_events: u64,
    pub auto_labeling: AutoLabelingSummary,
    pub api_usage: ApiUsageSummary,
    pub performance: PerformanceSummary,
    pub errors: ErrorSummary,
    pub user_engagement: UserEngagementSummary,
    pub system: SystemEventSummary,
}

impl SystemSummary {
    /// Zeroed summary for a window without data.
    pub fn empty(time_range: TimeRange) -> Self {
        Self {
            time_range,
            total_events: 0,
            auto_labeling: AutoLabelingSummary::default(),
            api_usage: ApiUsageSummary::default(),
            performance: PerformanceSummary::default(),
            errors: ErrorSummary::default(),
            user_engagement: UserEngagementSummary::default(),
            system: SystemEventSummary::default(),
        }
    }

    /// Aggregate the events that fall inside `time_range`.
    ///
    /// Events outside the window are ignored, so callers may pass the
    /// whole store.
    pub fn aggregate<'a, I>(time_range: TimeRange, events: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricEvent>,
    {
        let mut acc = Accumulator::default();
        for event in events {
            if time_range.contains(event.timestamp) {
                acc.add(event);
            }
        }
        acc.finish(time_range)
    }
}

// Duration sums are f64 so producer-supplied values cannot overflow them.
#[derive(Default)]
struct Accumulator {
    total: u64,

    labeling: u64,
    accuracy_sum: f64,
    accuracy_samples: u64,
    confidence_sum: f64,
    processing_sum: f64,
    components_detected: u64,
    manual_overrides: u64,
    labels_applied: u64,

    api_total: u64,
    api_success: u64,
    response_sum: f64,
    // (timestamp, remaining, limit) of the newest event carrying rate-limit info
    latest_rate_limit: Option<(DateTime<Utc>, u32, Option<u32>)>,
    endpoints: BTreeMap<String, u64>,

    perf_total: u64,
    perf_success: u64,
    perf_duration_sum: f64,
    slowest: Option<(String, u64)>,

    errors: u64,
    errors_by_component: BTreeMap<String, u64>,
    errors_by_type: BTreeMap<String, u64>,
    critical_by_component: BTreeMap<String, u64>,

    engagement: u64,
    users: BTreeSet<String>,
    actions: BTreeMap<String, u64>,

    system: u64,
    system_events: BTreeMap<String, u64>,
}

impl Accumulator {
    fn add(&mut self, event: &MetricEvent) {
        self.total += 1;
        match &event.payload {
            MetricPayload::AutoLabeling(e) => {
                self.labeling += 1;
                if let Some(accuracy) = e.accuracy {
                    self.accuracy_sum += accuracy;
                    self.accuracy_samples += 1;
                }
                self.confidence_sum += e.confidence;
                self.processing_sum += e.processing_time_ms as f64;
                self.components_detected += u64::from(e.component_detected);
                self.manual_overrides += u64::from(e.manual_override);
                self.labels_applied += e.labels_applied.len() as u64;
            }
            MetricPayload::ApiUsage(e) => {
                self.api_total += 1;
                self.api_success += u64::from(e.success);
                self.response_sum += e.response_time_ms as f64;
                *self.endpoints.entry(e.endpoint.clone()).or_default() += 1;
                if let Some(remaining) = e.rate_limit_remaining {
                    let newer = self
                        .latest_rate_limit
                        .is_none_or(|(ts, _, _)| event.timestamp >= ts);
                    if newer {
                        self.latest_rate_limit =
                            Some((event.timestamp, remaining, e.rate_limit_limit));
                    }
                }
            }
            MetricPayload::Performance(e) => {
                self.perf_total += 1;
                self.perf_success += u64::from(e.success);
                self.perf_duration_sum += e.duration_ms as f64;
                if self.slowest.as_ref().is_none_or(|(_, d)| e.duration_ms > *d) {
                    self.slowest = Some((e.operation.clone(), e.duration_ms));
                }
            }
            MetricPayload::UserEngagement(e) => {
                self.engagement += 1;
                if let Some(ref user) = e.user {
                    self.users.insert(user.clone());
                }
                *self.actions.entry(e.action.clone()).or_default() += 1;
            }
            MetricPayload::Error(e) => {
                self.errors += 1;
                *self.errors_by_component.entry(e.component.clone()).or_default() += 1;
                *self.errors_by_type.entry(e.error_type.clone()).or_default() += 1;
                if e.severity == ErrorSeverity::Critical {
                    *self
                        .critical_by_component
                        .entry(e.component.clone())
                        .or_default() += 1;
                }
            }
            MetricPayload::System(e) => {
                self.system += 1;
                *self.system_events.entry(e.event.clone()).or_default() += 1;
            }
        }
    }

    fn finish(self, time_range: TimeRange) -> SystemSummary {
        let operations = self.api_total + self.labeling + self.perf_total;
        let error_rate = if operations > 0 {
            self.errors as f64 / operations as f64
        } else if self.errors > 0 {
            1.0
        } else {
            0.0
        };

        let (rate_limit_remaining, rate_limit_limit) = match self.latest_rate_limit {
            Some((_, remaining, limit)) => (Some(remaining), limit),
            None => (None, None),
        };

        let (slowest_operation, slowest_duration_ms) = match self.slowest {
            Some((op, d)) => (Some(op), d),
            None => (None, 0),
        };

        SystemSummary {
            time_range,
            total_events: self.total,
            auto_labeling: AutoLabelingSummary {
                total: self.labeling,
                accuracy_samples: self.accuracy_samples,
                average_accuracy: ratio(self.accuracy_sum, self.accuracy_samples),
                average_confidence: ratio(self.confidence_sum, self.labeling),
                average_processing_time_ms: ratio(self.processing_sum, self.labeling),
                component_detection_rate: ratio(self.components_detected as f64, self.labeling),
                manual_override_rate: ratio(self.manual_overrides as f64, self.labeling),
                labels_applied: self.labels_applied,
            },
            api_usage: ApiUsageSummary {
                total_requests: self.api_total,
                successful_requests: self.api_success,
                failed_requests: self.api_total - self.api_success,
                success_rate: ratio(self.api_success as f64, self.api_total),
                average_response_time_ms: ratio(self.response_sum, self.api_total),
                rate_limit_remaining,
                rate_limit_limit,
                requests_by_endpoint: self.endpoints,
            },
            performance: PerformanceSummary {
                total_operations: self.perf_total,
                average_duration_ms: ratio(self.perf_duration_sum, self.perf_total),
                success_rate: ratio(self.perf_success as f64, self.perf_total),
                slowest_operation,
                slowest_duration_ms,
            },
            errors: ErrorSummary {
                total_errors: self.errors,
                error_rate,
                by_component: self.errors_by_component,
                by_type: self.errors_by_type,
                critical_by_component: self.critical_by_component,
            },
            user_engagement: UserEngagementSummary {
                total_actions: self.engagement,
                unique_users: self.users.len() as u64,
                by_action: self.actions,
            },
            system: SystemEventSummary {
                total_events: self.system,
                by_event: self.system_events,
            },
        }
    }
}

fn ratio(sum: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}
