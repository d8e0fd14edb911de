//! Environmental Telemetry Pipeline CLI
//!
//! A command-line tool for querying measurements, rollups, alerts,
//! system logs and outlier activity from a running pipeline.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Environmental Telemetry Pipeline CLI
#[derive(Parser)]
#[command(name = "etp")]
#[command(author, version, about = "CLI for the Environmental Telemetry Pipeline", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via ETP_API_URL env var)
    #[arg(long, env = "ETP_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recent raw measurements
    Measurements {
        /// Query window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u32>,
    },

    /// List minute rollups
    Summaries {
        /// Query window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },

    /// List threshold alert events
    Alerts {
        /// Query window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Filter by severity (warning, critical)
        #[arg(long)]
        severity: Option<String>,
    },

    /// List operational system logs
    Logs {
        /// Query window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Filter by level (e.g. ERROR, INFO)
        #[arg(long)]
        level: Option<String>,

        /// Filter by component (e.g. ingest, retention)
        #[arg(long)]
        component: Option<String>,
    },

    /// Outlier activity
    #[command(subcommand)]
    Outliers(OutlierCommands),

    /// Per-metric mean and variability over a window
    Stats {
        /// Query window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

#[derive(Subcommand)]
pub enum OutlierCommands {
    /// Aggregate counts of flagged readings
    Summary,

    /// Most recently flagged readings
    Recent {
        /// Maximum number of rows
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Measurements { hours, limit } => {
            commands::measurements::run(&client, hours, limit, cli.format).await
        }
        Commands::Summaries { hours } => commands::summaries::run(&client, hours, cli.format).await,
        Commands::Alerts { hours, severity } => {
            commands::alerts::run(&client, hours, severity, cli.format).await
        }
        Commands::Logs {
            hours,
            level,
            component,
        } => commands::logs::run(&client, hours, level, component, cli.format).await,
        Commands::Outliers(OutlierCommands::Summary) => {
            commands::outliers::summary(&client, cli.format).await
        }
        Commands::Outliers(OutlierCommands::Recent { limit }) => {
            commands::outliers::recent(&client, limit, cli.format).await
        }
        Commands::Stats { hours } => commands::stats::run(&client, hours, cli.format).await,
    }
}
