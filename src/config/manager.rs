//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for all overrides
pub const ENV_PREFIX: &str = "FALLBACK_PROXY_";

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, layered over environment overrides
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::load_from_file_with_vars(path, env_lookup)
    }

    /// Load `path` over defaults plus the variables `lookup` returns.
    ///
    /// Keys present in the file win; every other key keeps its environment
    /// or default value.
    pub fn load_from_file_with_vars<F>(path: &Path, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut base = Config::default();
        Self::apply_vars(&mut base, lookup)?;

        let config = if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            Self::parse_over(&base, &content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            base
        };

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Parse TOML configuration text
    pub fn parse(content: &str) -> Result<Config> {
        Self::parse_over(&Config::default(), content)
    }

    /// Parse TOML configuration text, taking keys it omits from `base`
    pub fn parse_over(base: &Config, content: &str) -> Result<Config> {
        let mut merged = toml::Value::try_from(base)?;
        let overlay: toml::Value = toml::from_str(content)?;
        merge_toml(&mut merged, overlay);
        Ok(merged.try_into()?)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_vars(env_lookup)
    }

    /// Apply overrides from `lookup` (keyed without the prefix) on top of defaults
    pub fn load_from_vars<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        Self::apply_vars(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_vars<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Some(addr) = lookup("PRIMARY_ADDR") {
            config.server.primary_addr = addr;
        }

        if let Some(addr) = lookup("SECONDARY_ADDR") {
            config.server.secondary_addr = addr;
        }

        if let Some(timeout) = lookup("CONNECT_TIMEOUT") {
            config.server.connect_timeout = Some(
                humantime::parse_duration(&timeout)
                    .with_context(|| format!("Invalid {}CONNECT_TIMEOUT: {}", ENV_PREFIX, timeout))?,
            );
        }

        if let Some(nodelay) = lookup("NODELAY") {
            config.relay.nodelay = nodelay
                .parse::<bool>()
                .with_context(|| format!("Invalid {}NODELAY: {}", ENV_PREFIX, nodelay))?;
        }

        if let Some(hex_output) = lookup("HEX_OUTPUT") {
            config.relay.hex_output = hex_output
                .parse::<bool>()
                .with_context(|| format!("Invalid {}HEX_OUTPUT: {}", ENV_PREFIX, hex_output))?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(())
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

/// Overlay `overlay` onto `base`: tables merge per key, other values replace
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen_addr: Option<String>,
    pub primary_addr: Option<String>,
    pub secondary_addr: Option<String>,
    pub connect_timeout: Option<u64>,
    pub nodelay: bool,
    pub hex_output: bool,
    pub verbose: bool,
    pub very_verbose: bool,
    pub color: bool,
    pub log_level: Option<String>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_relay_config()
            .with_context(|| "Relay configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        for (name, addr) in [
            ("listen_addr", &self.server.listen_addr),
            ("primary_addr", &self.server.primary_addr),
            ("secondary_addr", &self.server.secondary_addr),
        ] {
            validate_host_port(addr).with_context(|| format!("Invalid {}", name))?;
        }

        if let Some(timeout) = self.server.connect_timeout {
            if timeout == Duration::ZERO {
                bail!("connect_timeout must be greater than 0");
            }
        }

        if self.server.shutdown_timeout == Duration::ZERO {
            bail!("shutdown_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_relay_config(&self) -> Result<()> {
        if self.relay.buffer_size < 1024 {
            bail!("buffer_size must be at least 1024 bytes");
        }

        if self.relay.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, cli: &CliOverrides) {
        if let Some(addr) = &cli.listen_addr {
            self.server.listen_addr = addr.clone();
            tracing::info!("CLI override: listen address set to {}", addr);
        }

        if let Some(addr) = &cli.primary_addr {
            self.server.primary_addr = addr.clone();
            tracing::info!("CLI override: primary address set to {}", addr);
        }

        if let Some(addr) = &cli.secondary_addr {
            self.server.secondary_addr = addr.clone();
            tracing::info!("CLI override: secondary address set to {}", addr);
        }

        if let Some(timeout_secs) = cli.connect_timeout {
            self.server.connect_timeout = Some(Duration::from_secs(timeout_secs));
            tracing::info!("CLI override: connect timeout set to {}s", timeout_secs);
        }

        // Flags can only switch features on
        self.relay.nodelay |= cli.nodelay;
        self.relay.hex_output |= cli.hex_output;
        self.logging.verbose |= cli.verbose || cli.very_verbose;
        self.logging.very_verbose |= cli.very_verbose;
        self.logging.color |= cli.color;

        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }
}

/// Check that `addr` looks like `host:port` (host may be empty)
fn validate_host_port(addr: &str) -> Result<()> {
    if addr.is_empty() {
        bail!("address must not be empty");
    }

    let (_, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("'{}' is missing a port", addr))?;

    port.parse::<u16>()
        .with_context(|| format!("'{}' has an invalid port", addr))?;

    Ok(())
}
