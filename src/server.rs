//! Logging setup and the HTTP surface for IssueWatch.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use issuewatch_config::{ConfigLoader, LoggingConfig};
use issuewatch_monitor::{
    AlertHistoryFilter, DashboardFormat, HealthStatus, MetricEvent, MetricPayload,
    MonitoringExportOptions, MonitoringOrchestrator,
};
use issuewatch_protocols::Credential;

/// Initialize tracing with console and optional file output.
///
/// Console output goes to stderr so command output on stdout stays clean.
/// Log files are rotated daily and the last 30 are kept.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = if logging.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &logging.directory {
        Some(dir) => {
            let log_dir = ConfigLoader::expand_path(&dir.to_string_lossy());
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("issuewatch")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the writer alive for the program duration.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(())
}

/// Shared handler state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub monitor: Arc<MonitoringOrchestrator>,
    pub credential: Option<Credential>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    #[serde(default)]
    format: Option<String>,
}

/// Build the HTTP router.
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/dashboard", get(dashboard))
        .route("/alerts", get(alerts))
        .route("/export", get(export))
        .route("/metrics/{category}", post(ingest))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe: quick check, 503 when unhealthy.
async fn health(State(state): State<AppState>) -> Response {
    let result = state
        .monitor
        .health()
        .get_quick_health(state.credential.as_ref())
        .await;
    let code = match result.overall {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(result)).into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    Json(state.monitor.get_status(state.credential.as_ref()).await).into_response()
}

async fn dashboard(State(state): State<AppState>, Query(query): Query<DashboardQuery>) -> Response {
    let format = match query.format.as_deref().map(str::parse::<DashboardFormat>) {
        None => DashboardFormat::Markdown,
        Some(Ok(format)) => format,
        Some(Err(e)) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response();
        }
    };

    let body = state
        .monitor
        .get_dashboard(state.credential.as_ref(), format)
        .await;
    let content_type = match format {
        DashboardFormat::Markdown => "text/markdown; charset=utf-8",
        DashboardFormat::Json => "application/json",
        DashboardFormat::Text => "text/plain; charset=utf-8",
    };
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn alerts(State(state): State<AppState>, Query(filter): Query<AlertHistoryFilter>) -> Response {
    let alerting = state.monitor.alerting();
    let overview = alerting.overview(&filter);
    Json(json!({
        "active": overview.active,
        "history": alerting.get_alert_history(&filter),
        "stats": overview.stats,
    }))
    .into_response()
}

/// Telemetry from external producers. The body is the event for
/// `category` (`autoLabeling`, `apiUsage`, `performance`, `userEngagement`,
/// `error` or `system`), stamped on arrival.
async fn ingest(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let payload: MetricPayload =
        match serde_json::from_value(json!({ "category": category, "data": body })) {
            Ok(payload) => payload,
            Err(e) => {
                let error = format!("invalid {} event: {}", category, e);
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response();
            }
        };

    let event = MetricEvent::now(payload);
    let category = event.category();
    match state.monitor.metrics().record_event(event) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "category": category })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn export(
    State(state): State<AppState>,
    Query(options): Query<MonitoringExportOptions>,
) -> Response {
    match state.monitor.export_monitoring_data(&options) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Start monitoring (when enabled) and serve until Ctrl-C.
pub(crate) async fn run_server(
    state: AppState,
    host: &str,
    port: u16,
    monitoring_enabled: bool,
) -> anyhow::Result<()> {
    if monitoring_enabled {
        let credential = state
            .credential
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no API token; pass --token or set GITHUB_TOKEN"))?;
        state.monitor.start(credential).await?;
    } else {
        warn!("monitoring.enabled is false, serving endpoints without the periodic cycle");
    }

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("IssueWatch v{} ready:", env!("CARGO_PKG_VERSION"));
    info!("  GET  /health     - quick health check");
    info!("  GET  /status     - full status snapshot");
    info!("  GET  /dashboard  - dashboard (?format=markdown|json|text)");
    info!("  GET  /alerts     - active alerts, history and stats");
    info!("  GET  /export     - monitoring data export");
    info!("  POST /metrics/{{category}} - telemetry ingestion");
    info!("Listening on http://{}", addr);

    let monitor = state.monitor.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    monitor.stop().await;
    info!("Shutting down...");
    Ok(())
}
