//! Fallback Proxy
//!
//! Relays TCP connections to a primary upstream, falling back to a secondary
//! upstream when the primary cannot be reached.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fallback_proxy::config::{CliOverrides, Config, ConfigManager, LoggingConfig};
use fallback_proxy::logger::startup_subscriber;
use fallback_proxy::{ProxyServer, ShutdownCoordinator};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "fallback-proxy")]
#[command(about = "TCP proxy with primary/secondary upstream fallback")]
#[command(version)]
#[command(long_about = "
TCP proxy with primary/secondary upstream fallback

Every accepted connection is relayed to the primary upstream. If the primary
cannot be dialed, the secondary is tried once before the connection is dropped.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  FALLBACK_PROXY_LISTEN_ADDR      - Local address (e.g., :9999)
  FALLBACK_PROXY_PRIMARY_ADDR     - Primary remote address
  FALLBACK_PROXY_SECONDARY_ADDR   - Secondary remote address
  FALLBACK_PROXY_CONNECT_TIMEOUT  - Dial timeout (e.g., 5s, 500ms)
  FALLBACK_PROXY_NODELAY          - Disable Nagle's algorithm (true/false)
  FALLBACK_PROXY_HEX_OUTPUT       - Trace bytes as hex (true/false)
  FALLBACK_PROXY_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Local address
    #[arg(short, long, help = "Local address (e.g., :9999)")]
    pub local: Option<String>,

    /// Primary remote address
    #[arg(short, long, help = "Primary remote address (e.g., localhost:80)")]
    pub primary: Option<String>,

    /// Secondary remote address
    #[arg(short, long, help = "Secondary remote address (e.g., localhost:81)")]
    pub secondary: Option<String>,

    /// Display server actions
    #[arg(short, long, help = "Display server actions")]
    pub verbose: bool,

    /// Display server actions and all tcp data
    #[arg(long = "vv", help = "Display server actions and all tcp data")]
    pub very_verbose: bool,

    /// Disable Nagle's algorithm
    #[arg(short, long, help = "Disable nagles algorithm")]
    pub nodelay: bool,

    /// Output traced data as hex
    #[arg(short = 'x', long, help = "Output hex")]
    pub hex: bool,

    /// Colorize output
    #[arg(short, long, help = "Output ansi colors")]
    pub color: bool,

    /// Configuration file path
    #[arg(long, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Dial timeout in seconds
    #[arg(long, help = "Dial timeout in seconds for each upstream")]
    pub connect_timeout: Option<u64>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

impl CliArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            listen_addr: self.local.clone(),
            primary_addr: self.primary.clone(),
            secondary_addr: self.secondary.clone(),
            connect_timeout: self.connect_timeout,
            nodelay: self.nodelay,
            hex_output: self.hex,
            verbose: self.verbose,
            very_verbose: self.very_verbose,
            color: self.color,
            log_level: self.log_level.clone(),
        }
    }

    /// Level for the events emitted while the configuration loads
    fn startup_level(&self) -> &str {
        if self.very_verbose {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or("info")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Startup events go to a scoped subscriber until the final level is known
    let config = tracing::subscriber::with_default(
        startup_subscriber(args.startup_level(), args.color, std::io::stdout),
        || load_config(&args),
    )?;

    init_tracing(&config.logging)?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Local address: {}", config.server.listen_addr);
        info!("  Primary address: {}", config.server.primary_addr);
        info!("  Secondary address: {}", config.server.secondary_addr);
        info!("  Connect timeout: {:?}", config.server.connect_timeout);
        info!("  Nodelay: {}", config.relay.nodelay);
        info!("  Buffer size: {} bytes", config.relay.buffer_size);
        return Ok(());
    }

    let server = ProxyServer::bind(&config).await?;
    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let shutdown_rx = shutdown_coordinator.subscribe();

    tokio::select! {
        result = server.run(shutdown_rx) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
            }
            info!("Initiating graceful shutdown...");
        }
    }

    shutdown_coordinator.drain_sessions(&server).await;
    info!("Proxy shutdown complete");

    Ok(())
}

/// Load configuration with priority: CLI args > config file > environment > defaults
fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load_from_env()?,
    };

    config.merge_with_cli_args(&args.overrides());

    config
        .validate()
        .context("Final configuration validation failed")?;

    Ok(config)
}

/// Initialize tracing/logging
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.effective_level()));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(logging.color),
        )
        .with(env_filter)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}
