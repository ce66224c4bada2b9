//! Endpoint Connector
//!
//! Dials the primary upstream and, only if that dial fails, the secondary.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::logger::SessionLogger;
use crate::Result;

/// Which upstream a session ended up connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Primary,
    Secondary,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::Primary => write!(f, "primary"),
            Upstream::Secondary => write!(f, "secondary"),
        }
    }
}

/// Resolved addresses of the two upstreams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub primary: SocketAddr,
    pub secondary: SocketAddr,
}

impl Endpoints {
    pub fn new(primary: SocketAddr, secondary: SocketAddr) -> Self {
        Self { primary, secondary }
    }
}

/// Opens the outbound connection for one session
pub struct EndpointConnector {
    log: Arc<dyn SessionLogger>,
    connect_timeout: Option<Duration>,
}

impl EndpointConnector {
    /// Create a connector relying on the platform's TCP connect timeout
    pub fn new(log: Arc<dyn SessionLogger>) -> Self {
        Self {
            log,
            connect_timeout: None,
        }
    }

    /// Bound each dial attempt by `connect_timeout` when set
    pub fn with_timeout(log: Arc<dyn SessionLogger>, connect_timeout: Option<Duration>) -> Self {
        Self {
            log,
            connect_timeout,
        }
    }

    /// Connect to the primary, falling back to the secondary.
    ///
    /// The two dials are strictly sequential and the secondary is never dialed
    /// once the primary succeeded, so at most one outbound connection exists.
    pub async fn connect(&self, endpoints: &Endpoints) -> Result<(TcpStream, Upstream)> {
        let primary_error = match self.dial(endpoints.primary).await {
            Ok(stream) => {
                self.log_opened(Upstream::Primary, &stream, endpoints.primary);
                return Ok((stream, Upstream::Primary));
            }
            Err(e) => {
                self.log
                    .warn(format_args!("Remote primary connection failed: {}", e));
                e
            }
        };

        match self.dial(endpoints.secondary).await {
            Ok(stream) => {
                self.log_opened(Upstream::Secondary, &stream, endpoints.secondary);
                Ok((stream, Upstream::Secondary))
            }
            Err(e) => {
                self.log
                    .warn(format_args!("Remote secondary connection failed: {}", e));
                Err(anyhow!(
                    "Both upstreams unreachable (primary {}: {}; secondary {}: {})",
                    endpoints.primary,
                    primary_error,
                    endpoints.secondary,
                    e
                ))
            }
        }
    }

    /// Single dial attempt, no retry
    async fn dial(&self, addr: SocketAddr) -> Result<TcpStream> {
        match self.connect_timeout {
            Some(limit) => match timeout(limit, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(anyhow!("{}: {}", addr, e)),
                Err(_) => Err(anyhow!("{}: connection timed out after {:?}", addr, limit)),
            },
            None => TcpStream::connect(addr)
                .await
                .map_err(|e| anyhow!("{}: {}", addr, e)),
        }
    }

    fn log_opened(&self, upstream: Upstream, stream: &TcpStream, remote: SocketAddr) {
        let local = stream
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "?".to_string());
        self.log.info(format_args!(
            "Opened {} connection {} >>> {}",
            upstream, local, remote
        ));
    }
}
