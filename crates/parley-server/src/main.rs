//! # Parley Server
//!
//! Realtime presence and message relay server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with a config file from the default search path
//! PARLEY_AUTH__SECRET=change-me parley
//!
//! # Run with custom config
//! parley --config /path/to/parley.toml
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 PARLEY_AUTH__SECRET=change-me parley
//! ```

mod api;
mod cli;
mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_server=info,parley_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();

    // Load configuration
    let config = match cli.config {
        Some(path) => config::Config::load_from(Some(&path))?,
        None => config::Config::load()?,
    };
    config.validate()?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    if config.metrics.enabled {
        metrics::init_metrics();
    }

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

