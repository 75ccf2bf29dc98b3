//! Site Analytics Service
//!
//! Entry point for the analytics pipeline. One binary runs the ingestion
//! API, the reporting API, the queue worker, or all three.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use analytics_service::config::config_file;
use analytics_service::{
    initialize_logging_with_config, install_metrics_exporter, load_configuration,
    setup_signal_handlers, Role, ServiceState,
};

#[derive(Parser)]
#[command(name = "analytics-service")]
#[command(about = "Website analytics pipeline: ingestion, reporting and queue worker")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to $ANALYTICS_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `POST /event`
    Ingest,

    /// Serve `GET /stats`
    Report,

    /// Move queued events into the database
    Worker,

    /// Run ingestion, reporting and the worker in one process
    All,

    /// Print the effective configuration as TOML and exit
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;

    let role = match cli.command {
        Commands::Ingest => Role::Ingest,
        Commands::Report => Role::Report,
        Commands::Worker => Role::Worker,
        Commands::All => Role::All,
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }
    };

    initialize_logging_with_config(&config.logging)?;
    info!("Starting Analytics Service v{} ({:?})", env!("CARGO_PKG_VERSION"), role);
    match config_file(cli.config.as_deref()) {
        Some(path) => info!("Configuration loaded from file: {:?}", path),
        None => info!("Configuration loaded from defaults and environment"),
    }

    if config.metrics.enabled {
        install_metrics_exporter(&config.metrics)?;
    }

    let shutdown = setup_signal_handlers()?;
    info!("Signal handlers configured");

    let state = ServiceState::new(config, role).await.context("Failed to initialize service")?;
    state.run(shutdown).await?;

    info!("Analytics Service shutdown complete");
    Ok(())
}
