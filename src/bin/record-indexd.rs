//! Record index daemon.
//!
//! Opens (or creates) the SQLite file, ensures the `records` table and serves
//! the HTTP API until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:5000, data/database.db
//! record-indexd
//!
//! # Custom database file and port
//! record-indexd --database /data/database.db --port 8080
//!
//! # Use configuration file
//! record-indexd --config /etc/record-index.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use record_index::config::ServiceConfig;
use record_index::engine::RecordEngine;
use record_index::server;
use record_index::storage::SqliteStore;

/// Record index server
#[derive(Parser, Debug)]
#[command(name = "record-indexd", version, about = "Record index HTTP server")]
struct Args {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "RECORD_INDEX_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, env = "RECORD_INDEX_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short = 'd', long, value_name = "FILE", env = "RECORD_INDEX_DATABASE")]
    database: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", env = "RECORD_INDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "RECORD_INDEX_LOG_LEVEL")]
    log_level: String,

    /// Print configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    run_server(config).await
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_new(format!("record_index={level},record_indexd={level}"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_config(args: &Args) -> Result<ServiceConfig> {
    let mut config = if let Some(path) = &args.config {
        ServiceConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?
    } else {
        ServiceConfig::default()
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }

    Ok(config)
}

async fn run_server(config: ServiceConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database_path.display(),
        "starting record index"
    );

    let store = SqliteStore::open(&config.database_path, config.busy_timeout())
        .with_context(|| {
            format!(
                "Failed to open database {}",
                config.database_path.display()
            )
        })?;
    let engine = RecordEngine::new(store).context("Failed to read stored ids")?;

    server::serve(&config, engine, shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}
