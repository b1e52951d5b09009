//! # IAFactory Gateway
//!
//! Credit-metered, OpenAI-compatible gateway for Large Language Models.
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! iafactory-gateway
//!
//! # Start with a config file
//! iafactory-gateway --config /path/to/gateway.yaml
//!
//! # Environment overrides
//! GATEWAY_PORT=9000 iafactory-gateway
//! ```

use clap::Parser;
use gateway_config::{load_config, GatewayConfig, LogFormat};
use gateway_server::{AppState, Server, ServerConfig};
use gateway_telemetry::{init_logging, LoggingConfig};
use std::path::PathBuf;
use tracing::{error, info};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "iafactory-gateway", version, about)]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter directive, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}

/// Application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    let format = match config.logging.format {
        LogFormat::Pretty => gateway_telemetry::LogFormat::Pretty,
        LogFormat::Json => gateway_telemetry::LogFormat::Json,
    };
    if let Err(e) = init_logging(&LoggingConfig::new(&config.logging.level).with_format(format)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting IAFactory gateway"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        providers = config.providers.len(),
        "Configuration loaded"
    );

    let server_config = ServerConfig::from_settings(&config.server);
    let state = AppState::from_config(config)?;

    info!(
        providers = state.router.registry().len(),
        "Provider registry initialized"
    );

    Server::new(server_config, state).run().await?;

    info!("Gateway shutdown complete");
    Ok(())
}
