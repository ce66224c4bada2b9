//! Session Logging
//!
//! Leveled logging capability handed to every relay session. The session code
//! only ever talks to [`SessionLogger`]; where the events end up is decided by
//! the implementation.

use std::fmt;

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Leveled logging capability used by the connector and relay session
pub trait SessionLogger: Send + Sync {
    /// Connection opened/closed events
    fn info(&self, args: fmt::Arguments<'_>);

    /// Dial and I/O failures
    fn warn(&self, args: fmt::Arguments<'_>);

    /// Per-block transfer events
    fn debug(&self, args: fmt::Arguments<'_>);

    /// Relayed byte content
    fn trace(&self, args: fmt::Arguments<'_>);

    /// Whether trace events are emitted at all. Callers use this to skip
    /// rendering byte content nobody will see.
    fn trace_enabled(&self) -> bool {
        true
    }
}

/// Logger that forwards to `tracing`, prefixing every message
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    prefix: String,
}

impl TracingLogger {
    /// Create a logger without a prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger whose messages all start with `prefix`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Prefix used for connection number `id`, e.g. `Connection #007 `
    pub fn for_connection(id: u64) -> Self {
        Self::with_prefix(format!("Connection #{:03} ", id))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl SessionLogger for TracingLogger {
    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!("{}{}", self.prefix, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!("{}{}", self.prefix, args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!("{}{}", self.prefix, args);
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        tracing::trace!("{}{}", self.prefix, args);
    }

    fn trace_enabled(&self) -> bool {
        tracing::enabled!(Level::TRACE)
    }
}

/// Logger that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl SessionLogger for NullLogger {
    fn info(&self, _args: fmt::Arguments<'_>) {}
    fn warn(&self, _args: fmt::Arguments<'_>) {}
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn trace(&self, _args: fmt::Arguments<'_>) {}

    fn trace_enabled(&self) -> bool {
        false
    }
}

/// Subscriber for the events emitted while configuration is loaded, before
/// the final level and color are known. `RUST_LOG` still takes precedence.
pub fn startup_subscriber<W>(level: &str, color: bool, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(color)
        .with_writer(writer)
        .finish()
}
