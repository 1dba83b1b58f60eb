//! Incident controller CLI
//!
//! A command-line tool for listing, inspecting and resolving the
//! incidents and alerts raised by the pod incident controller.

mod client;
mod commands;
mod config;
mod duration;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, incidents, status};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Pod incident controller CLI
#[derive(Parser)]
#[command(name = "incictl")]
#[command(author, version, about = "CLI for the pod incident controller", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via INCICTL_API_URL env var)
    #[arg(long, env = "INCICTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and resolve restart incidents
    #[command(subcommand)]
    Incidents(IncidentCommands),

    /// Inspect and acknowledge phase alerts
    #[command(subcommand)]
    Alerts(AlertCommands),

    /// Show watch state and record counts
    Status,
}

#[derive(Subcommand)]
pub enum IncidentCommands {
    /// List incidents, newest first
    List {
        /// Maximum number of incidents to fetch
        #[arg(long, short)]
        limit: Option<u32>,

        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by severity (low, medium, high, critical)
        #[arg(long, short)]
        severity: Option<String>,
    },

    /// Show one incident with its root cause analysis
    Get {
        /// Incident ID
        id: String,
    },

    /// Mark an incident as healed
    Resolve {
        /// Incident ID
        id: String,
    },

    /// Show incident statistics and MTTR
    Stats {
        /// Number of most affected pods to show
        #[arg(long)]
        top: Option<u32>,
    },

    /// Remove incidents older than a duration
    Evict {
        /// Age threshold (e.g., 30s, 15m, 24h, 7d)
        #[arg(long, value_parser = duration::parse_duration_secs)]
        older_than: u64,
    },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List alerts, newest first
    List {
        /// Maximum number of alerts to fetch
        #[arg(long, short)]
        limit: Option<u32>,

        /// Show only firing alerts
        #[arg(long)]
        firing: bool,
    },

    /// Show one alert
    Get {
        /// Alert ID
        id: String,
    },

    /// Acknowledge an alert
    Ack {
        /// Alert ID
        id: String,
    },

    /// Show alert statistics
    Stats,

    /// Remove alerts older than a duration
    Evict {
        /// Age threshold (e.g., 30s, 15m, 24h, 7d)
        #[arg(long, value_parser = duration::parse_duration_secs)]
        older_than: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = match cli.api_url {
        Some(url) => url,
        None => config::Config::load()?
            .api_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
    };

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;
    let format = cli.format;

    // Execute command
    match cli.command {
        Commands::Incidents(cmd) => match cmd {
            IncidentCommands::List {
                limit,
                namespace,
                severity,
            } => {
                incidents::list_incidents(&client, limit, namespace, severity, format).await?;
            }
            IncidentCommands::Get { id } => {
                incidents::get_incident(&client, &id, format).await?;
            }
            IncidentCommands::Resolve { id } => {
                incidents::resolve_incident(&client, &id, format).await?;
            }
            IncidentCommands::Stats { top } => {
                incidents::show_stats(&client, top, format).await?;
            }
            IncidentCommands::Evict { older_than } => {
                incidents::evict_incidents(&client, older_than, format).await?;
            }
        },
        Commands::Alerts(cmd) => match cmd {
            AlertCommands::List { limit, firing } => {
                alerts::list_alerts(&client, limit, firing, format).await?;
            }
            AlertCommands::Get { id } => {
                alerts::get_alert(&client, &id, format).await?;
            }
            AlertCommands::Ack { id } => {
                alerts::acknowledge_alert(&client, &id, format).await?;
            }
            AlertCommands::Stats => {
                alerts::show_stats(&client, format).await?;
            }
            AlertCommands::Evict { older_than } => {
                alerts::evict_alerts(&client, older_than, format).await?;
            }
        },
        Commands::Status => {
            status::show_status(&client, format).await?;
        }
    }

    Ok(())
}
