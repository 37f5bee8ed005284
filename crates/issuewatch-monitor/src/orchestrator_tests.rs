use std::sync::atomic::{AtomicBool, AtomicU64};

use async_trait::async_trait;

use issuewatch_protocols::{ApiStatus, ClientError, Identity};

use super::*;
use crate::alerting::CRITICAL_ERROR_METRIC;
use crate::alerts::Alert;
use crate::metrics_types::{MetricEvent, MetricPayload};

#[derive(Default)]
struct FakeClient {
    unreachable: AtomicBool,
    panic_on_status: AtomicBool,
    status_delay_secs: AtomicU64,
}

#[async_trait]
impl RepositoryClient for FakeClient {
    async fn check_status(&self, _credential: Option<&Credential>) -> Result<ApiStatus, ClientError> {
        let delay = self.status_delay_secs.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
        if self.panic_on_status.load(Ordering::SeqCst) {
            panic!("status decoder bug");
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Unreachable("connection refused".to_string()));
        }
        Ok(ApiStatus {
            reachable: true,
            latency_ms: 20,
            rate_limit: None,
        })
    }

    async fn authenticated_identity(&self, _credential: &Credential) -> Result<Identity, ClientError> {
        Ok(Identity {
            login: "issuewatch-bot".to_string(),
            kind: None,
        })
    }
}

fn orchestrator() -> (MonitoringOrchestrator, Arc<FakeClient>) {
    orchestrator_with(MonitoringConfig::default())
}

fn orchestrator_with(config: MonitoringConfig) -> (MonitoringOrchestrator, Arc<FakeClient>) {
    let client = Arc::new(FakeClient::default());
    (MonitoringOrchestrator::new(config, client.clone()), client)
}

fn token() -> Credential {
    Credential::new("ghp_test")
}

fn system_events(orchestrator: &MonitoringOrchestrator, event: &str) -> u64 {
    orchestrator
        .metrics()
        .summary_for_last(Duration::from_secs(86_400))
        .system
        .by_event
        .get(event)
        .copied()
        .unwrap_or(0)
}

fn cycle_count(orchestrator: &MonitoringOrchestrator) -> u64 {
    orchestrator
        .metrics()
        .snapshot()
        .iter()
        .filter(|e| {
            matches!(
                &e.payload,
                crate::metrics_types::MetricPayload::Performance(p) if p.operation == "monitoring_cycle"
            )
        })
        .count() as u64
}

fn find_alert<'a>(alerts: &'a [Alert], component: &str, metric: &str) -> Option<&'a Alert> {
    alerts
        .iter()
        .find(|a| a.component == component && a.metric == metric)
}

#[tokio::test]
async fn test_start_requires_credential() {
    let (orchestrator, _) = orchestrator();
    let err = orchestrator.start(Credential::new("  ")).await.unwrap_err();
    assert!(matches!(err, MonitorError::StartupFailure(_)));
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn test_start_fails_when_healthy_start_required() {
    let config = MonitoringConfig {
        require_healthy_start: true,
        ..Default::default()
    };
    let (orchestrator, client) = orchestrator_with(config);
    client.unreachable.store(true, Ordering::SeqCst);

    let err = orchestrator.start(token()).await.unwrap_err();
    assert!(err.to_string().contains("github_api"));
    assert!(!orchestrator.is_running());
    assert!(orchestrator.health().latest().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_immediate_check() {
    let (orchestrator, _) = orchestrator();
    orchestrator.start(token()).await.unwrap();

    assert!(orchestrator.is_running());
    assert_eq!(orchestrator.health().history(None).len(), 1);
    assert_eq!(orchestrator.health().current_status(), HealthStatus::Healthy);
    assert_eq!(system_events(&orchestrator, "monitoring_started"), 1);

    // second start is a no-op
    orchestrator.start(token()).await.unwrap();
    assert_eq!(orchestrator.health().history(None).len(), 1);
    assert_eq!(system_events(&orchestrator, "monitoring_started"), 1);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cycles_run_on_interval() {
    let (orchestrator, _) = orchestrator();
    orchestrator.start(token()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(cycle_count(&orchestrator), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cycle_count(&orchestrator), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(cycle_count(&orchestrator), 3);
    assert_eq!(orchestrator.health().history(None).len(), 4);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let (orchestrator, _) = orchestrator();
    orchestrator.start(token()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    orchestrator.stop().await;
    orchestrator.stop().await;

    assert!(!orchestrator.is_running());
    assert_eq!(orchestrator.health().get_uptime(), Duration::ZERO);
    assert_eq!(system_events(&orchestrator, "monitoring_stopped"), 1);

    // no cycles after stop
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(cycle_count(&orchestrator), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_is_clean() {
    let (orchestrator, _) = orchestrator();
    orchestrator.start(token()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert!(orchestrator.health().get_uptime() >= Duration::from_secs(90));
    assert_eq!(cycle_count(&orchestrator), 1);

    orchestrator.stop().await;
    orchestrator.start(token()).await.unwrap();
    assert!(orchestrator.health().get_uptime() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_secs(61)).await;
    // one cycle before the restart, exactly one after
    assert_eq!(cycle_count(&orchestrator), 2);
    assert_eq!(system_events(&orchestrator, "monitoring_started"), 2);

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cycle_failure_raises_self_alert_and_continues() {
    let (orchestrator, client) = orchestrator_with(MonitoringConfig {
        cycle_timeout_secs: 10,
        ..Default::default()
    });
    orchestrator.start(token()).await.unwrap();

    // The probe timeout is longer than the cycle timeout, so the cycle overruns
    client.status_delay_secs.store(3600, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(71)).await;

    let active = orchestrator.alerting().get_active_alerts();
    let alert = find_alert(&active, SELF_COMPONENT, "cycle").expect("self alert");
    assert_eq!(alert.level, AlertLevel::Critical);

    let errors = orchestrator
        .metrics()
        .summary_for_last(Duration::from_secs(3600))
        .errors;
    assert_eq!(errors.by_component.get(SELF_COMPONENT), Some(&1));

    // still running, and repeated failures keep a single alert
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(orchestrator.is_running());
    let active = orchestrator.alerting().get_active_alerts();
    assert_eq!(
        active.iter().filter(|a| a.component == SELF_COMPONENT).count(),
        1
    );

    // recovery resolves it
    client.status_delay_secs.store(0, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    let active = orchestrator.alerting().get_active_alerts();
    assert!(find_alert(&active, SELF_COMPONENT, "cycle").is_none());

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_component_alerts_on_cycle() {
    let (orchestrator, client) = orchestrator();
    orchestrator.start(token()).await.unwrap();
    assert!(orchestrator.alerting().get_active_alerts().is_empty());

    client.unreachable.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(61)).await;

    let active = orchestrator.alerting().get_active_alerts();
    let alert = find_alert(&active, "github_api", "status").expect("status alert");
    assert_eq!(alert.level, AlertLevel::Critical);

    client.unreachable.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(orchestrator.alerting().get_active_alerts().is_empty());

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_critical_error_triggers_immediate_alert() {
    let (orchestrator, _) = orchestrator();
    orchestrator.start(token()).await.unwrap();

    orchestrator
        .metrics()
        .track_error(ErrorEvent {
            component: "classifier".to_string(),
            error_type: "ModelLoad".to_string(),
            message: "weights missing".to_string(),
            severity: ErrorSeverity::Critical,
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let active = orchestrator.alerting().get_active_alerts();
    let alert = find_alert(&active, "classifier", CRITICAL_ERROR_METRIC).expect("critical alert");
    assert_eq!(alert.level, AlertLevel::Critical);
    assert!(alert.message.contains("weights missing"));

    // the error is still inside the summary window, so a cycle keeps it
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(cycle_count(&orchestrator), 1);
    let active = orchestrator.alerting().get_active_alerts();
    assert!(find_alert(&active, "classifier", CRITICAL_ERROR_METRIC).is_some());

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_critical_error_alert_resolves_once_outside_window() {
    let (orchestrator, _) = orchestrator();
    orchestrator.start(token()).await.unwrap();

    // Reported late, already older than the one hour summary window
    orchestrator
        .metrics()
        .record_event(MetricEvent::at(
            Utc::now() - chrono::Duration::hours(2),
            MetricPayload::Error(ErrorEvent {
                component: "classifier".to_string(),
                error_type: "ModelLoad".to_string(),
                message: "weights missing".to_string(),
                severity: ErrorSeverity::Critical,
            }),
        ))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let active = orchestrator.alerting().get_active_alerts();
    assert!(find_alert(&active, "classifier", CRITICAL_ERROR_METRIC).is_some());

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(orchestrator.alerting().get_active_alerts().is_empty());
    let history = orchestrator
        .alerting()
        .get_alert_history(&AlertHistoryFilter::default());
    assert!(find_alert(&history, "classifier", CRITICAL_ERROR_METRIC).is_some());

    // later clean cycles do not resolve it again
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(
        orchestrator
            .alerting()
            .get_alert_history(&AlertHistoryFilter::default())
            .len(),
        1
    );

    orchestrator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_cycle_applies_no_state() {
    let (orchestrator, client) = orchestrator();
    orchestrator.start(token()).await.unwrap();

    client.status_delay_secs.store(20, Ordering::SeqCst);
    client.unreachable.store(true, Ordering::SeqCst);
    // the first cycle starts at 60s and waits on the API until 80s
    tokio::time::sleep(Duration::from_secs(65)).await;

    let events_before = orchestrator.metrics().get_total_event_count();
    orchestrator.stop().await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(orchestrator.health().history(None).len(), 1);
    assert_eq!(
        orchestrator
            .alerting()
            .get_alert_stats(&AlertHistoryFilter::default())
            .total,
        0
    );
    assert_eq!(cycle_count(&orchestrator), 0);
    // only the stop itself was recorded
    assert_eq!(orchestrator.metrics().get_total_event_count(), events_before + 1);
    assert_eq!(system_events(&orchestrator, "monitoring_stopped"), 1);
}

#[tokio::test]
async fn test_panicking_client_does_not_break_start_or_status() {
    let (orchestrator, client) = orchestrator();
    client.panic_on_status.store(true, Ordering::SeqCst);

    let status = orchestrator.get_status(Some(&token())).await;
    assert_eq!(status.overall(), HealthStatus::Unhealthy);
    let github = &status.health.as_ref().unwrap().components["github_api"];
    assert!(github.message.as_deref().unwrap().contains("status decoder bug"));

    orchestrator.start(token()).await.unwrap();
    assert!(orchestrator.is_running());
    assert_eq!(orchestrator.health().current_status(), HealthStatus::Unhealthy);
    orchestrator.stop().await;
}

#[tokio::test]
async fn test_panicking_client_fails_healthy_start_cleanly() {
    let (orchestrator, client) = orchestrator_with(MonitoringConfig {
        require_healthy_start: true,
        ..Default::default()
    });
    client.panic_on_status.store(true, Ordering::SeqCst);

    let err = orchestrator.start(token()).await.unwrap_err();
    assert!(matches!(err, MonitorError::StartupFailure(_)));
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn test_get_status_is_idempotent() {
    let (orchestrator, _) = orchestrator();

    let first = orchestrator.get_status(Some(&token())).await;
    let second = orchestrator.get_status(Some(&token())).await;

    let statuses = |s: &MonitoringStatus| -> Vec<(String, HealthStatus)> {
        s.health
            .as_ref()
            .map(|h| h.components.iter().map(|(k, v)| (k.clone(), v.status)).collect())
            .unwrap_or_default()
    };
    assert_eq!(first.overall(), second.overall());
    assert_eq!(statuses(&first), statuses(&second));
    assert_eq!(
        first.metrics.as_ref().map(|m| m.total_events),
        second.metrics.as_ref().map(|m| m.total_events)
    );
    assert_eq!(first.alerts, second.alerts);

    assert!(!first.running);
    assert_eq!(orchestrator.metrics().get_total_event_count(), 0);
    assert!(orchestrator.health().latest().is_none());
}

#[tokio::test]
async fn test_get_status_reflects_probe_failures() {
    let (orchestrator, client) = orchestrator();
    client.unreachable.store(true, Ordering::SeqCst);

    let status = orchestrator.get_status(Some(&token())).await;
    assert_eq!(status.overall(), HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_get_dashboard_formats() {
    let (orchestrator, _) = orchestrator();

    let text = orchestrator
        .get_dashboard(Some(&token()), DashboardFormat::Text)
        .await;
    assert!(text.contains("health=healthy"));

    let json = orchestrator
        .get_dashboard(Some(&token()), DashboardFormat::Json)
        .await;
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["running"], false);
    assert_eq!(value["health"]["overall"], "healthy");

    let md = orchestrator
        .get_dashboard(None, DashboardFormat::Markdown)
        .await;
    assert!(md.contains("# IssueWatch Monitoring Dashboard"));
}

#[tokio::test]
async fn test_self_test_passes() {
    let (orchestrator, _) = orchestrator();
    let report = orchestrator.test_monitoring(Some(&token())).await;

    assert!(report.passed, "{:?}", report.checks);
    let names: Vec<&str> = report.checks.iter().map(|c| c.subsystem.as_str()).collect();
    assert_eq!(names, vec!["metrics", "health", "alerting", "dashboard"]);
    // the scratch alerting instance leaves real state alone
    assert_eq!(
        orchestrator
            .alerting()
            .get_alert_stats(&AlertHistoryFilter::default())
            .total,
        0
    );
}

#[tokio::test]
async fn test_self_test_reports_unhealthy_dependency() {
    let (orchestrator, client) = orchestrator();
    client.unreachable.store(true, Ordering::SeqCst);

    let report = orchestrator.test_monitoring(Some(&token())).await;
    assert!(!report.passed);
    let health = report.checks.iter().find(|c| c.subsystem == "health").unwrap();
    assert!(!health.passed);
}

#[tokio::test]
async fn test_export_monitoring_data() {
    let (orchestrator, _) = orchestrator();
    orchestrator.health().perform_health_check(Some(&token())).await;
    orchestrator
        .metrics()
        .track_performance(PerformanceEvent {
            operation: "label_issue".to_string(),
            duration_ms: 40,
            success: true,
            metadata: None,
        })
        .unwrap();

    let summary_only = orchestrator
        .export_monitoring_data(&MonitoringExportOptions::default())
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&summary_only).unwrap();
    assert_eq!(value["health"]["history"].as_array().unwrap().len(), 1);
    assert_eq!(value["metrics"]["summary"]["performance"]["total_operations"], 1);
    assert!(value["metrics"]["events"].is_null());
    assert_eq!(value["alerts"]["overview"]["stats"]["total"], 0);
    assert_eq!(value["counters"]["health_checks"], 1);
    assert_eq!(value["counters"]["unhealthy_checks"], 0);
    assert_eq!(value["counters"]["events_recorded"], 1);
    assert_eq!(value["counters"]["events_stored"], 1);
    assert_eq!(value["counters"]["events_rejected"], 0);

    let with_raw = orchestrator
        .export_monitoring_data(&MonitoringExportOptions {
            hours: Some(1),
            include_raw: true,
            health_history_limit: Some(0),
        })
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&with_raw).unwrap();
    assert_eq!(value["metrics"]["events"].as_array().unwrap().len(), 1);
    assert!(value["health"]["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_instances_are_independent() {
    let (a, _) = orchestrator();
    let (b, _) = orchestrator();
    a.metrics()
        .track_system(SystemEvent {
            event: "only_a".to_string(),
            details: None,
        })
        .unwrap();
    assert_eq!(a.metrics().get_total_event_count(), 1);
    assert_eq!(b.metrics().get_total_event_count(), 0);
}
