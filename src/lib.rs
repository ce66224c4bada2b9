//! Fallback Proxy Library
//!
//! Relays inbound TCP connections to a primary upstream, falling back to a
//! secondary upstream when the primary cannot be reached.

pub mod config;
pub mod logger;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use logger::{NullLogger, SessionLogger, TracingLogger};
pub use relay::{EndpointConnector, RelayOptions, RelaySession, SessionOutcome, Upstream};
pub use server::ProxyServer;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the proxy
pub type Result<T> = anyhow::Result<T>;
