use super::*;
use chrono::Duration as ChronoDuration;

use crate::metrics_types::ErrorSeverity;

fn collector() -> MetricsCollector {
    MetricsCollector::new(Duration::from_secs(30 * 86_400), 10_000, Arc::new(EventBus::default()))
}

fn api_event(success: bool, response_time_ms: u64) -> ApiUsageEvent {
    ApiUsageEvent {
        endpoint: "/repos/acme/widgets/issues".to_string(),
        method: "GET".to_string(),
        status_code: if success { 200 } else { 502 },
        response_time_ms,
        success,
        rate_limit_remaining: None,
        rate_limit_limit: None,
    }
}

fn labeling_event(accuracy: f64, processing_time_ms: u64) -> AutoLabelingEvent {
    AutoLabelingEvent {
        issue_number: Some(42),
        accuracy: Some(accuracy),
        confidence: 0.9,
        processing_time_ms,
        labels_applied: vec!["bug".to_string()],
        component_detected: true,
        manual_override: false,
    }
}

fn error_event(component: &str) -> ErrorEvent {
    ErrorEvent {
        component: component.to_string(),
        error_type: "Timeout".to_string(),
        message: "upstream timed out".to_string(),
        severity: ErrorSeverity::High,
    }
}

#[test]
fn test_api_success_rate() {
    let metrics = collector();
    for i in 0..100 {
        metrics.track_api_usage(api_event(i >= 5, 200)).unwrap();
    }

    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.api_usage.total_requests, 100);
    assert_eq!(summary.api_usage.failed_requests, 5);
    assert!((summary.api_usage.success_rate - 0.95).abs() < 1e-9);
    assert_eq!(summary.api_usage.average_response_time_ms, 200.0);
}

#[test]
fn test_window_counts_only_events_inside() {
    let metrics = collector();
    let now = Utc::now();
    let inside = now - ChronoDuration::minutes(30);
    let before = now - ChronoDuration::hours(3);
    let after = now + ChronoDuration::hours(3);

    for ts in [inside, inside, before, after] {
        metrics
            .record_event(MetricEvent::at(ts, MetricPayload::ApiUsage(api_event(true, 100))))
            .unwrap();
    }

    let range = TimeRange::new(now - ChronoDuration::hours(1), now);
    let summary = metrics.get_system_summary(range);
    assert_eq!(summary.total_events, 2);
    assert_eq!(summary.api_usage.total_requests, 2);
}

#[test]
fn test_window_bounds_are_inclusive() {
    let metrics = collector();
    let start = Utc::now() - ChronoDuration::hours(2);
    let end = start + ChronoDuration::hours(1);

    for ts in [start, end, end + ChronoDuration::milliseconds(1)] {
        metrics
            .record_event(MetricEvent::at(ts, MetricPayload::ApiUsage(api_event(true, 100))))
            .unwrap();
    }

    let summary = metrics.get_system_summary(TimeRange::new(start, end));
    assert_eq!(summary.total_events, 2);
}

#[test]
fn test_retention_excludes_old_events() {
    let metrics = MetricsCollector::new(
        Duration::from_secs(86_400),
        10_000,
        Arc::new(EventBus::default()),
    );
    let now = Utc::now();
    metrics
        .record_event(MetricEvent::at(
            now - ChronoDuration::days(3),
            MetricPayload::ApiUsage(api_event(true, 100)),
        ))
        .unwrap();
    metrics.track_api_usage(api_event(true, 100)).unwrap();

    // Even a window reaching back a week only sees retained events
    let range = TimeRange::new(now - ChronoDuration::days(7), Utc::now());
    let summary = metrics.get_system_summary(range);
    assert_eq!(summary.api_usage.total_requests, 1);
    assert_eq!(metrics.snapshot().len(), 1);
}

#[test]
fn test_purge_expired() {
    let metrics = MetricsCollector::new(
        Duration::from_secs(3600),
        10_000,
        Arc::new(EventBus::default()),
    );
    metrics.track_api_usage(api_event(true, 100)).unwrap();
    // Inserted behind the write path so only purge can reach it
    {
        let mut events = metrics.events.write();
        events.push_back(MetricEvent::at(
            Utc::now() - ChronoDuration::hours(5),
            MetricPayload::ApiUsage(api_event(true, 100)),
        ));
    }
    assert_eq!(metrics.stored_event_count(), 2);
    assert_eq!(metrics.purge_expired(), 1);
    assert_eq!(metrics.stored_event_count(), 1);
}

#[test]
fn test_max_events_cap() {
    let metrics = MetricsCollector::new(Duration::from_secs(3600), 3, Arc::new(EventBus::default()));
    for _ in 0..5 {
        metrics.track_api_usage(api_event(true, 100)).unwrap();
    }
    assert_eq!(metrics.stored_event_count(), 3);
    assert_eq!(metrics.get_total_event_count(), 5);
}

#[test]
fn test_empty_window_is_zeroed() {
    let metrics = collector();
    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.total_events, 0);
    assert_eq!(summary.api_usage.success_rate, 0.0);
    assert_eq!(summary.errors.error_rate, 0.0);
    assert_eq!(summary.auto_labeling.average_accuracy, 0.0);
    assert!(summary.api_usage.rate_limit_ratio().is_none());
}

#[test]
fn test_auto_labeling_aggregates() {
    let metrics = collector();
    metrics.track_auto_labeling(labeling_event(0.8, 100)).unwrap();
    metrics.track_auto_labeling(labeling_event(0.6, 300)).unwrap();
    metrics
        .track_auto_labeling(AutoLabelingEvent {
            issue_number: None,
            accuracy: None,
            confidence: 0.5,
            processing_time_ms: 200,
            labels_applied: vec![],
            component_detected: false,
            manual_override: true,
        })
        .unwrap();

    let summary = metrics.summary_for_last(Duration::from_secs(3600)).auto_labeling;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.accuracy_samples, 2);
    assert!((summary.average_accuracy - 0.7).abs() < 1e-9);
    assert!((summary.average_processing_time_ms - 200.0).abs() < 1e-9);
    assert!((summary.component_detection_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!((summary.manual_override_rate - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.labels_applied, 2);
}

#[test]
fn test_error_rate_over_operations() {
    let metrics = collector();
    for _ in 0..18 {
        metrics.track_api_usage(api_event(true, 100)).unwrap();
    }
    metrics.track_auto_labeling(labeling_event(0.9, 100)).unwrap();
    metrics
        .track_performance(PerformanceEvent {
            operation: "label_issue".to_string(),
            duration_ms: 50,
            success: true,
            metadata: None,
        })
        .unwrap();
    metrics.track_error(error_event("classifier")).unwrap();
    metrics.track_error(error_event("api")).unwrap();

    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.errors.total_errors, 2);
    assert!((summary.errors.error_rate - 0.1).abs() < 1e-9);
    assert_eq!(summary.errors.by_component.get("classifier"), Some(&1));
    assert_eq!(summary.errors.by_type.get("Timeout"), Some(&2));
}

#[test]
fn test_error_rate_without_operations() {
    let metrics = collector();
    metrics.track_error(error_event("classifier")).unwrap();
    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.errors.error_rate, 1.0);
}

#[test]
fn test_huge_durations_do_not_overflow_summary() {
    let metrics = collector();
    metrics.track_auto_labeling(labeling_event(0.9, u64::MAX)).unwrap();
    metrics.track_auto_labeling(labeling_event(0.9, 10)).unwrap();
    metrics.track_api_usage(api_event(true, u64::MAX)).unwrap();
    metrics.track_api_usage(api_event(true, u64::MAX)).unwrap();
    for duration_ms in [u64::MAX, u64::MAX, 5] {
        metrics
            .track_performance(PerformanceEvent {
                operation: "label_issue".to_string(),
                duration_ms,
                success: true,
                metadata: None,
            })
            .unwrap();
    }

    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.auto_labeling.total, 2);
    assert!(summary.auto_labeling.average_processing_time_ms.is_finite());
    assert!(summary.auto_labeling.average_processing_time_ms > 1e18);
    assert!(summary.api_usage.average_response_time_ms.is_finite());
    assert!(summary.performance.average_duration_ms.is_finite());
    assert_eq!(summary.performance.slowest_duration_ms, u64::MAX);
}

#[test]
fn test_critical_errors_counted_per_component() {
    let metrics = collector();
    metrics.track_error(error_event("api")).unwrap();
    for _ in 0..2 {
        metrics
            .track_error(ErrorEvent {
                severity: ErrorSeverity::Critical,
                ..error_event("classifier")
            })
            .unwrap();
    }

    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.errors.total_errors, 3);
    assert_eq!(summary.errors.critical_by_component.get("classifier"), Some(&2));
    assert!(!summary.errors.critical_by_component.contains_key("api"));
}

#[test]
fn test_backfilled_event_evicted_on_write() {
    let metrics = MetricsCollector::new(
        Duration::from_secs(3600),
        10_000,
        Arc::new(EventBus::default()),
    );
    metrics.track_api_usage(api_event(true, 100)).unwrap();
    metrics
        .record_event(MetricEvent::at(
            Utc::now() - ChronoDuration::hours(5),
            MetricPayload::ApiUsage(api_event(true, 100)),
        ))
        .unwrap();

    assert_eq!(metrics.stored_event_count(), 1);
    assert_eq!(metrics.get_total_event_count(), 2);
    assert_eq!(metrics.purge_expired(), 0);
}

#[test]
fn test_max_events_cap_evicts_oldest_timestamp() {
    let metrics = MetricsCollector::new(Duration::from_secs(86_400), 2, Arc::new(EventBus::default()));
    let now = Utc::now();
    metrics.track_api_usage(api_event(true, 100)).unwrap();
    metrics.track_api_usage(api_event(true, 200)).unwrap();
    // Older than both stored events, so it is the one dropped by the cap
    metrics
        .record_event(MetricEvent::at(
            now - ChronoDuration::minutes(30),
            MetricPayload::ApiUsage(api_event(true, 900)),
        ))
        .unwrap();

    let stored = metrics.snapshot();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|e| e.timestamp >= now));
    assert!(stored.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_latest_rate_limit_wins() {
    let metrics = collector();
    let now = Utc::now();
    let mut older = api_event(true, 100);
    older.rate_limit_remaining = Some(4000);
    older.rate_limit_limit = Some(5000);
    let mut newer = api_event(true, 100);
    newer.rate_limit_remaining = Some(250);
    newer.rate_limit_limit = Some(5000);

    metrics
        .record_event(MetricEvent::at(now, MetricPayload::ApiUsage(newer)))
        .unwrap();
    metrics
        .record_event(MetricEvent::at(
            now - ChronoDuration::minutes(10),
            MetricPayload::ApiUsage(older),
        ))
        .unwrap();

    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.api_usage.rate_limit_remaining, Some(250));
    assert!((summary.api_usage.rate_limit_ratio().unwrap() - 0.05).abs() < 1e-9);
}

#[test]
fn test_engagement_and_system_aggregates() {
    let metrics = collector();
    for user in ["alice", "bob", "alice"] {
        metrics
            .track_user_engagement(UserEngagementEvent {
                action: "label_feedback".to_string(),
                user: Some(user.to_string()),
                issue_number: None,
            })
            .unwrap();
    }
    metrics
        .track_system(SystemEvent {
            event: "monitoring_started".to_string(),
            details: None,
        })
        .unwrap();

    let summary = metrics.summary_for_last(Duration::from_secs(3600));
    assert_eq!(summary.user_engagement.total_actions, 3);
    assert_eq!(summary.user_engagement.unique_users, 2);
    assert_eq!(summary.system.by_event.get("monitoring_started"), Some(&1));
}

#[test]
fn test_validation_rejects_missing_fields() {
    let metrics = collector();
    let mut bad = api_event(true, 100);
    bad.endpoint = "  ".to_string();
    assert!(matches!(
        metrics.track_api_usage(bad),
        Err(MonitorError::InvalidEvent { .. })
    ));

    let mut bad_accuracy = labeling_event(0.9, 100);
    bad_accuracy.accuracy = Some(1.5);
    assert!(metrics.track_auto_labeling(bad_accuracy).is_err());

    assert!(metrics
        .track_system(SystemEvent {
            event: String::new(),
            details: None
        })
        .is_err());

    assert_eq!(metrics.get_total_event_count(), 0);
    assert_eq!(metrics.rejected_event_count(), 3);
}

#[tokio::test]
async fn test_track_error_publishes_notification() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let metrics = MetricsCollector::new(Duration::from_secs(3600), 100, bus);

    metrics.track_error(error_event("classifier")).unwrap();

    match rx.recv().await.unwrap() {
        MonitorEvent::ErrorOccurred { error, .. } => assert_eq!(error.component, "classifier"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_export_json() {
    let metrics = collector();
    metrics.track_api_usage(api_event(true, 120)).unwrap();
    metrics.track_error(error_event("api")).unwrap();

    let output = metrics.export_metrics(&ExportOptions::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["event_count"], 2);
    assert_eq!(value["events"].as_array().unwrap().len(), 2);
    assert_eq!(value["summary"]["api_usage"]["total_requests"], 1);
}

#[test]
fn test_export_json_filtered_summary_only() {
    let metrics = collector();
    metrics.track_api_usage(api_event(true, 120)).unwrap();
    metrics.track_error(error_event("api")).unwrap();

    let options = ExportOptions {
        categories: Some(vec![MetricCategory::Error]),
        include_raw: false,
        ..Default::default()
    };
    let output = metrics.export_metrics(&options).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["event_count"], 1);
    assert!(value.get("events").is_none());
    assert_eq!(value["summary"]["errors"]["total_errors"], 1);
}

#[test]
fn test_export_csv() {
    let metrics = collector();
    metrics.track_api_usage(api_event(false, 900)).unwrap();
    metrics
        .track_performance(PerformanceEvent {
            operation: "sync, full".to_string(),
            duration_ms: 12,
            success: true,
            metadata: None,
        })
        .unwrap();

    let options = ExportOptions {
        format: ExportFormat::Csv,
        ..Default::default()
    };
    let csv = metrics.export_metrics(&options).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,category,key,value,success");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",apiUsage,GET /repos/acme/widgets/issues,900,false"));
    assert!(lines[2].contains("\"sync, full\""));
}
