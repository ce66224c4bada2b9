//! Proxy Server
//!
//! Accept loop handing every inbound connection to its own relay session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::net::{lookup_host, TcpListener};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::logger::{SessionLogger, TracingLogger};
use crate::relay::{Endpoints, RelayOptions, RelaySession, SessionOutcome};
use crate::Result;

/// Resolve a `host:port` address; an empty host means all IPv4 interfaces
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    let target = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    let mut addrs = lookup_host(target.as_str())
        .await
        .with_context(|| format!("Failed to resolve address {}", addr))?;

    addrs
        .next()
        .ok_or_else(|| anyhow!("Address {} resolved to nothing", addr))
}

/// Accepts connections and spawns one relay session per connection
pub struct ProxyServer {
    listener: TcpListener,
    endpoints: Endpoints,
    options: RelayOptions,
    next_connection_id: AtomicU64,
    active_sessions: Arc<AtomicUsize>,
}

impl ProxyServer {
    /// Resolve the configured addresses and bind the listener
    pub async fn bind(config: &Config) -> Result<Self> {
        let listen_addr = resolve_addr(&config.server.listen_addr)
            .await
            .context("Failed to resolve local address")?;
        let primary = resolve_addr(&config.server.primary_addr)
            .await
            .context("Failed to resolve primary address")?;
        let secondary = resolve_addr(&config.server.secondary_addr)
            .await
            .context("Failed to resolve secondary address")?;

        info!("Binding TCP listener to {}", listen_addr);
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to open local port to listen on {}", listen_addr))?;

        Ok(Self::from_listener(
            listener,
            Endpoints::new(primary, secondary),
            RelayOptions::from_config(config),
        ))
    }

    /// Build a server around an already bound listener
    pub fn from_listener(listener: TcpListener, endpoints: Endpoints, options: RelayOptions) -> Self {
        Self {
            listener,
            endpoints,
            options,
            next_connection_id: AtomicU64::new(1),
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    /// Number of sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Accept connections until a shutdown signal arrives.
    ///
    /// Sessions already running are left alone when the loop stops.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "Proxying from {} to {} with fallback to {}",
            self.local_addr()?,
            self.endpoints.primary,
            self.endpoints.secondary
        );

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                            debug!("Accepted connection #{:03} from {}", connection_id, addr);
                            self.spawn_session(stream, connection_id);
                        }
                        Err(e) => {
                            // Keep accepting even if one accept fails
                            warn!("Failed to accept connection '{}'", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        info!("Connection acceptance loop stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, connection_id: u64) {
        let log: Arc<dyn SessionLogger> = Arc::new(TracingLogger::for_connection(connection_id));
        let session = RelaySession::new(stream, self.endpoints, self.options.clone(), log);
        let guard = ActiveSession::enter(Arc::clone(&self.active_sessions));

        tokio::spawn(async move {
            let _guard = guard;
            if let SessionOutcome::Aborted = session.start().await {
                debug!("Connection #{:03} aborted: no upstream reachable", connection_id);
            }
        });
    }
}

/// Keeps the active session count accurate however the session task ends
struct ActiveSession(Arc<AtomicUsize>);

impl ActiveSession {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_empty_host() {
        let addr = resolve_addr(":9999").await.unwrap();
        assert_eq!(addr, "0.0.0.0:9999".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = resolve_addr("127.0.0.1:80").await.unwrap();
        assert_eq!(addr.port(), 80);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_active_session_guard() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = ActiveSession::enter(Arc::clone(&counter));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(guard);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
