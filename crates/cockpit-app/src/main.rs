//! Trading cockpit - Entry Point

use anyhow::Result;
use clap::Parser;
use cockpit_app::{AppConfig, Application};
use std::path::Path;
use tracing::{info, warn};

/// Real-time trading cockpit
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via COCKPIT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Market event stream URL (overrides configuration)
    #[arg(long)]
    ws_url: Option<String>,

    /// Instrument selected at startup (overrides configuration)
    #[arg(long)]
    instrument: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// connection
    cockpit_ws::init_crypto();

    let args = Args::parse();

    // CLI arg > COCKPIT_CONFIG > config/default.toml
    let config_path = AppConfig::resolve_path(args.config);
    let mut config = AppConfig::load(&config_path)?;
    if let Some(ws_url) = args.ws_url {
        config.ws_url = ws_url;
    }
    if let Some(instrument) = args.instrument {
        config.instrument = instrument;
    }

    cockpit_telemetry::init_logging(config.telemetry.log_level.as_deref(), config.telemetry.json)?;

    info!("Starting cockpit v{}", env!("CARGO_PKG_VERSION"));
    if Path::new(&config_path).exists() {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(config_path = %config_path, "Config file not found, using defaults and environment");
    }

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
