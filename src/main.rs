//! IssueWatch - health monitoring and alerting for the issue automation service.
//!
//! Main entry point for the IssueWatch CLI and server.

mod adapters;
mod cli;
mod cmd_monitor;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use issuewatch_config::{Config, ConfigLoader, ConfigValidator};
use issuewatch_monitor::MonitoringOrchestrator;
use issuewatch_protocols::Credential;

use crate::adapters::{issuewatch_dir, GitHubClient};
use crate::cli::{Cli, Commands};
use crate::server::AppState;

/// Resolve the config path: the given one, else `~/.issuewatch/config.toml`
/// when the given one is missing and that exists.
fn resolve_config_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let fallback = issuewatch_dir().join("config.toml");
    if fallback.exists() {
        fallback
    } else {
        path.to_path_buf()
    }
}

/// `--token` / `GITHUB_TOKEN` wins over `github.token`.
fn resolve_credential(cli_token: Option<String>, config: &Config) -> Option<Credential> {
    cli_token
        .or_else(|| config.github.token.clone())
        .map(Credential::new)
        .filter(|c| !c.is_blank())
}

/// Log validation warnings; refuse to continue on errors.
fn ensure_valid(config: &Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    if let Some(first) = result.errors.first() {
        bail!(
            "invalid configuration ({} error(s)), first: {}: {}",
            result.errors.len(),
            first.path,
            first.message
        );
    }
    Ok(())
}

/// Validate the config, then build the orchestrator around a GitHub client
/// whose requests feed the orchestrator's metrics.
fn build_monitor(config: &Config) -> anyhow::Result<Arc<MonitoringOrchestrator>> {
    ensure_valid(config)?;
    let client = Arc::new(GitHubClient::new(&config.github).context("building GitHub client")?);
    let monitor = Arc::new(MonitoringOrchestrator::new(
        config.monitoring.clone(),
        client.clone(),
    ));
    client.attach_metrics(monitor.metrics().clone());
    Ok(monitor)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(&cli.config);
    let (config, found) = ConfigLoader::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    server::init_tracing(&config.logging)?;
    if found {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!("{} not found, using default configuration", config_path.display());
    }

    let credential = resolve_credential(cli.token, &config);
    let command = cli.command.unwrap_or(Commands::Run {
        host: None,
        port: None,
    });

    match command {
        Commands::CheckConfig => cmd_monitor::check_config(&config, &config_path, found),
        Commands::Run { host, port } => {
            let monitor = build_monitor(&config)?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let state = AppState { monitor, credential };
            server::run_server(state, &host, port, config.monitoring.enabled).await
        }
        Commands::Status { json } => {
            let monitor = build_monitor(&config)?;
            cmd_monitor::status(&monitor, credential.as_ref(), json).await
        }
        Commands::Dashboard { format } => {
            let monitor = build_monitor(&config)?;
            cmd_monitor::dashboard(&monitor, credential.as_ref(), format).await
        }
        Commands::Test => {
            let monitor = build_monitor(&config)?;
            cmd_monitor::self_test(&monitor, credential.as_ref()).await
        }
        Commands::Export { output, hours, raw } => {
            let monitor = build_monitor(&config)?;
            cmd_monitor::export(&monitor, credential.as_ref(), output, hours, raw).await
        }
    }
}
