//! VI monitor entry point.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use vimon_monitor::{AppConfig, Monitor};

/// Volatility Interruption monitor for the KOSPI/KOSDAQ realtime feed
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VIMON_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    vimon_ws::init_crypto();

    let args = Args::parse();

    // Determine config path: CLI arg > VIMON_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("VIMON_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = AppConfig::load(&config_path)?;

    let _log_guard = vimon_telemetry::init_logging(config.telemetry.log_dir.as_deref())?;

    info!("Starting VI monitor v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, ws_url = %config.websocket.url, "Configuration loaded");

    let monitor = Arc::new(Monitor::new(config));

    // Ctrl-C triggers a graceful stop.
    {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                monitor.stop();
            }
        });
    }

    monitor.start().await?;

    info!("VI monitor stopped");
    Ok(())
}
