//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::relay::DEFAULT_BUFFER_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

/// Listener and upstream addresses
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Local address to accept connections on; `:port` binds all interfaces
    pub listen_addr: String,
    pub primary_addr: String,
    pub secondary_addr: String,
    /// Per-dial bound; unset means the platform's TCP connect timeout
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Relay behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Disable Nagle's algorithm on both connections
    pub nodelay: bool,
    pub hex_output: bool,
    pub buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Show per-block transfer events
    pub verbose: bool,
    /// Show relayed bytes as well
    pub very_verbose: bool,
    pub color: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ":9999".to_string(),
            primary_addr: "localhost:80".to_string(),
            secondary_addr: "localhost:81".to_string(),
            connect_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            nodelay: false,
            hex_output: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
            very_verbose: false,
            color: false,
        }
    }
}

impl LoggingConfig {
    /// Level the subscriber should filter at, after verbosity flags
    pub fn effective_level(&self) -> &str {
        if self.very_verbose {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }
}
