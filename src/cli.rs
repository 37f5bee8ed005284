//! CLI definitions for IssueWatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use issuewatch_monitor::DashboardFormat;

/// IssueWatch CLI.
#[derive(Parser)]
#[command(name = "issuewatch")]
#[command(about = "Health monitoring and alerting for the issue automation service")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/issuewatch.toml", global = true)]
    pub config: PathBuf,

    /// API token, overrides `github.token` from the config file
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start monitoring and serve the HTTP endpoints (default)
    Run {
        /// Server host, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Server port, overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a full health check and print the status snapshot
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Render the dashboard
    Dashboard {
        /// Output format (markdown, json, text)
        #[arg(short, long, default_value_t = DashboardFormat::Markdown)]
        format: DashboardFormat,
    },

    /// Exercise every monitoring subsystem once
    Test,

    /// Export monitoring data as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Trailing window in hours (default: whole retention window)
        #[arg(long)]
        hours: Option<u64>,

        /// Include raw metric events
        #[arg(long)]
        raw: bool,
    },

    /// Validate the configuration file
    CheckConfig,
}
