//! One-shot monitoring subcommand handlers for IssueWatch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use tracing::info;

use issuewatch_config::{Config, ConfigValidator};
use issuewatch_monitor::dashboard::render;
use issuewatch_monitor::{DashboardFormat, MonitoringExportOptions, MonitoringOrchestrator};
use issuewatch_protocols::Credential;

/// Print the status snapshot.
pub(crate) async fn status(
    monitor: &MonitoringOrchestrator,
    credential: Option<&Credential>,
    as_json: bool,
) -> anyhow::Result<()> {
    let snapshot = monitor.get_status(credential).await;
    let format = if as_json {
        DashboardFormat::Json
    } else {
        DashboardFormat::Text
    };
    println!("{}", render(&snapshot, format));

    if as_json {
        return Ok(());
    }
    for (name, component) in snapshot.health.iter().flat_map(|h| &h.components) {
        println!(
            "  {} {:<16} {}",
            component.status.emoji(),
            name,
            component.message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Print the dashboard.
pub(crate) async fn dashboard(
    monitor: &MonitoringOrchestrator,
    credential: Option<&Credential>,
    format: DashboardFormat,
) -> anyhow::Result<()> {
    println!("{}", monitor.get_dashboard(credential, format).await);
    Ok(())
}

/// Run the self-test. Fails when any subsystem check fails.
pub(crate) async fn self_test(
    monitor: &MonitoringOrchestrator,
    credential: Option<&Credential>,
) -> anyhow::Result<()> {
    let report = monitor.test_monitoring(credential).await;
    for check in &report.checks {
        let mark = if check.passed { "✓" } else { "✗" };
        println!("{} {:<10} {}", mark, check.subsystem, check.message);
    }

    if !report.passed {
        bail!("monitoring self-test failed");
    }
    println!("All monitoring subsystems OK");
    Ok(())
}

/// Take one health check, then export everything as JSON.
pub(crate) async fn export(
    monitor: &MonitoringOrchestrator,
    credential: Option<&Credential>,
    output: Option<PathBuf>,
    hours: Option<u64>,
    raw: bool,
) -> anyhow::Result<()> {
    monitor.health().perform_health_check(credential).await;

    let options = MonitoringExportOptions {
        hours,
        include_raw: raw,
        health_history_limit: None,
    };
    let body = monitor.export_monitoring_data(&options)?;

    match output {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(default_export_name())
            } else {
                path
            };
            write_export(&path, &body)?;
            info!("Exported monitoring data to {}", path.display());
        }
        None => println!("{}", body),
    }
    Ok(())
}

fn write_export(path: &Path, body: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

/// Export file name used when `--output` is a directory.
fn default_export_name() -> String {
    format!("issuewatch-export-{}.json", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// Validate configuration and print every finding.
pub(crate) fn check_config(config: &Config, path: &Path, found: bool) -> anyhow::Result<()> {
    if found {
        println!("Configuration: {}", path.display());
    } else {
        println!("Configuration: {} not found, using defaults", path.display());
    }

    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("  warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("  error:   {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        bail!("{} configuration error(s)", result.errors.len());
    }
    println!("Configuration is valid");
    Ok(())
}
