//! Telemetry collection and time-windowed aggregation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::events::{EventBus, MonitorEvent};
use crate::metrics_summary::{SystemSummary, TimeRange};
use crate::metrics_types::{
    ApiUsageEvent, AutoLabelingEvent, ErrorEvent, MetricCategory, MetricEvent, MetricPayload,
    PerformanceEvent, SystemEvent, UserEngagementEvent,
};

/// Export serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// What [`MetricsCollector::export_metrics`] should include.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(default)]
    pub format: ExportFormat,
    /// Window to export. Defaults to the whole retention window.
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Restrict to these categories. All when unset.
    #[serde(default)]
    pub categories: Option<Vec<MetricCategory>>,
    /// Include raw events (JSON only; CSV is always raw).
    #[serde(default = "default_true")]
    pub include_raw: bool,
    /// Include the aggregate summary (JSON only).
    #[serde(default = "default_true")]
    pub include_summary: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            time_range: None,
            categories: None,
            include_raw: true,
            include_summary: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonExport<'a> {
    exported_at: DateTime<Utc>,
    time_range: TimeRange,
    event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SystemSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<&'a [MetricEvent]>,
}

/// Append-only telemetry store with retention-bounded queries.
///
/// Events are individually immutable and kept ordered by timestamp, so a
/// backfilled event lands in place rather than at the back. Eviction on
/// write drops expired events and then the oldest ones beyond the
/// `max_events` cap. Queries also filter by the retention cut-off, since
/// stored events keep aging between writes.
pub struct MetricsCollector {
    events: RwLock<VecDeque<MetricEvent>>,
    retention: Duration,
    max_events: usize,
    total_recorded: AtomicU64,
    rejected: AtomicU64,
    bus: Arc<EventBus>,
}

impl MetricsCollector {
    /// Create a collector.
    pub fn new(retention: Duration, max_events: usize, bus: Arc<EventBus>) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            retention,
            max_events: max_events.max(1),
            total_recorded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            bus,
        }
    }

    /// Retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Oldest timestamp still inside the retention window.
    pub fn retention_cutoff(&self) -> DateTime<Utc> {
        let span = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_sub_signed(span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn track_auto_labeling(&self, event: AutoLabelingEvent) -> Result<(), MonitorError> {
        self.record_event(MetricEvent::now(MetricPayload::AutoLabeling(event)))
    }

    pub fn track_api_usage(&self, event: ApiUsageEvent) -> Result<(), MonitorError> {
        self.record_event(MetricEvent::now(MetricPayload::ApiUsage(event)))
    }

    pub fn track_performance(&self, event: PerformanceEvent) -> Result<(), MonitorError> {
        self.record_event(MetricEvent::now(MetricPayload::Performance(event)))
    }

    pub fn track_user_engagement(&self, event: UserEngagementEvent) -> Result<(), MonitorError> {
        self.record_event(MetricEvent::now(MetricPayload::UserEngagement(event)))
    }

    /// Record an error and publish an "error occurred" notification.
    pub fn track_error(&self, event: ErrorEvent) -> Result<(), MonitorError> {
        self.record_event(MetricEvent::now(MetricPayload::Error(event)))
    }

    pub fn track_system(&self, event: SystemEvent) -> Result<(), MonitorError> {
        self.record_event(MetricEvent::now(MetricPayload::System(event)))
    }

    /// Record a pre-stamped event (backfill or replay).
    ///
    /// Events already outside the retention window are accepted and
    /// counted, then evicted in the same write.
    pub fn record_event(&self, event: MetricEvent) -> Result<(), MonitorError> {
        if let Err(e) = event.payload.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Rejected telemetry event: {}", e);
            return Err(e);
        }

        let notification = match &event.payload {
            MetricPayload::Error(error) => Some(MonitorEvent::ErrorOccurred {
                timestamp: event.timestamp,
                error: error.clone(),
            }),
            _ => None,
        };

        debug!("Recording {} event", event.category());
        {
            let cutoff = self.retention_cutoff();
            let mut events = self.events.write();
            let at = events.partition_point(|e| e.timestamp <= event.timestamp);
            events.insert(at, event);
            while events.front().is_some_and(|e| e.timestamp < cutoff) {
                events.pop_front();
            }
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
        self.total_recorded.fetch_add(1, Ordering::Relaxed);

        if let Some(notification) = notification {
            self.bus.publish(notification);
        }
        Ok(())
    }

    /// Aggregates over `[start, end]`, clipped to the retention window.
    pub fn get_system_summary(&self, time_range: TimeRange) -> SystemSummary {
        let events = self.events_in(time_range);
        SystemSummary::aggregate(time_range, &events)
    }

    /// Aggregates over the trailing `window`.
    pub fn summary_for_last(&self, window: Duration) -> SystemSummary {
        self.get_system_summary(TimeRange::trailing(window))
    }

    /// Copy of the retained events inside `time_range`.
    pub fn events_in(&self, time_range: TimeRange) -> Vec<MetricEvent> {
        let cutoff = self.retention_cutoff();
        self.events
            .read()
            .iter()
            .filter(|e| e.timestamp >= cutoff && time_range.contains(e.timestamp))
            .cloned()
            .collect()
    }

    /// Copy of every retained event.
    pub fn snapshot(&self) -> Vec<MetricEvent> {
        let cutoff = self.retention_cutoff();
        self.events
            .read()
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Drop events older than the retention window. Returns how many.
    pub fn purge_expired(&self) -> usize {
        let cutoff = self.retention_cutoff();
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        let purged = before - events.len();
        if purged > 0 {
            debug!("Purged {} expired metric events", purged);
        }
        purged
    }

    /// Events accepted since construction.
    pub fn get_total_event_count(&self) -> u64 {
        self.total_recorded.load(Ordering::Relaxed)
    }

    /// Events rejected by validation since construction.
    pub fn rejected_event_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Events currently held in memory.
    pub fn stored_event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Serialize raw and/or aggregated events.
    pub fn export_metrics(&self, options: &ExportOptions) -> Result<String, MonitorError> {
        let time_range = options
            .time_range
            .unwrap_or_else(|| TimeRange::new(self.retention_cutoff(), Utc::now()));

        let mut events = self.events_in(time_range);
        if let Some(ref categories) = options.categories {
            events.retain(|e| categories.contains(&e.category()));
        }

        match options.format {
            ExportFormat::Json => {
                let export = JsonExport {
                    exported_at: Utc::now(),
                    time_range,
                    event_count: events.len(),
                    summary: options
                        .include_summary
                        .then(|| SystemSummary::aggregate(time_range, &events)),
                    events: options.include_raw.then_some(events.as_slice()),
                };
                Ok(serde_json::to_string_pretty(&export)?)
            }
            ExportFormat::Csv => Ok(events_to_csv(&events)),
        }
    }
}

const CSV_HEADER: &str = "timestamp,category,key,value,success";

fn events_to_csv(events: &[MetricEvent]) -> String {
    let mut out = String::with_capacity(64 * (events.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for event in events {
        let (key, value, success) = csv_fields(&event.payload);
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            event.timestamp.to_rfc3339(),
            event.category(),
            csv_escape(&key),
            value,
            success.map(|s| s.to_string()).unwrap_or_default()
        ));
    }
    out
}

fn csv_fields(payload: &MetricPayload) -> (String, String, Option<bool>) {
    match payload {
        MetricPayload::AutoLabeling(e) => (
            e.issue_number
                .map(|n| format!("#{}", n))
                .unwrap_or_else(|| e.labels_applied.join(" ")),
            e.processing_time_ms.to_string(),
            Some(!e.manual_override),
        ),
        MetricPayload::ApiUsage(e) => (
            format!("{} {}", e.method, e.endpoint),
            e.response_time_ms.to_string(),
            Some(e.success),
        ),
        MetricPayload::Performance(e) => (
            e.operation.clone(),
            e.duration_ms.to_string(),
            Some(e.success),
        ),
        MetricPayload::UserEngagement(e) => (e.action.clone(), "1".to_string(), None),
        MetricPayload::Error(e) => (
            format!("{}:{}", e.component, e.error_type),
            "1".to_string(),
            Some(false),
        ),
        MetricPayload::System(e) => (e.event.clone(), String::new(), None),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
