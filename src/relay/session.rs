//! Relay Session
//!
//! One session per accepted connection: dial an upstream, run the two copy
//! tasks, and tear both connections down when the first of them stops.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::connector::{EndpointConnector, Endpoints, Upstream};
use super::pipe::{Direction, Pipe, DEFAULT_BUFFER_SIZE};
use super::stats::SessionStats;
use super::termination::{Termination, TerminationKind};
use crate::config::Config;
use crate::logger::SessionLogger;

/// Optional low-latency tuning. Connection types that cannot disable output
/// coalescing keep the default, which reports `Unsupported`.
pub trait SocketTuning {
    fn set_nodelay(&self, _nodelay: bool) -> io::Result<()> {
        Err(io::ErrorKind::Unsupported.into())
    }
}

impl SocketTuning for TcpStream {
    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        TcpStream::set_nodelay(self, nodelay)
    }
}

/// Per-session relay settings
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Disable output coalescing on both connections
    pub nodelay: bool,
    /// Render traced bytes as hex instead of text
    pub hex_output: bool,
    pub buffer_size: usize,
    pub connect_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            nodelay: false,
            hex_output: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: None,
        }
    }
}

impl RelayOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            nodelay: config.relay.nodelay,
            hex_output: config.relay.hex_output,
            buffer_size: config.relay.buffer_size,
            connect_timeout: config.server.connect_timeout,
        }
    }
}

/// Final state of a session that reached the relaying phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub upstream: Upstream,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub cause: TerminationKind,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Neither upstream could be reached; nothing was relayed
    Aborted,
    /// Relaying ran and was torn down
    Closed(SessionSummary),
}

/// Owns one inbound connection for its whole life
pub struct RelaySession<C = TcpStream> {
    inbound: C,
    endpoints: Endpoints,
    options: RelayOptions,
    log: Arc<dyn SessionLogger>,
    stats: Arc<SessionStats>,
}

impl<C> RelaySession<C>
where
    C: AsyncRead + AsyncWrite + SocketTuning + Send + 'static,
{
    /// Create a session that takes over `inbound` and closes it when finished
    pub fn new(
        inbound: C,
        endpoints: Endpoints,
        options: RelayOptions,
        log: Arc<dyn SessionLogger>,
    ) -> Self {
        Self {
            inbound,
            endpoints,
            options,
            log,
            stats: Arc::new(SessionStats::new()),
        }
    }

    /// Live byte counters of this session
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Connect upstream and relay until either side stops.
    ///
    /// Consumes the session: every exit path drops both connections.
    pub async fn start(self) -> SessionOutcome {
        let connector =
            EndpointConnector::with_timeout(Arc::clone(&self.log), self.options.connect_timeout);

        // On failure `self.inbound` is dropped on return, closing the client
        let (outbound, upstream) = match connector.connect(&self.endpoints).await {
            Ok(connected) => connected,
            Err(_) => return SessionOutcome::Aborted,
        };

        if self.options.nodelay {
            let _ = self.inbound.set_nodelay(true);
            let _ = outbound.set_nodelay(true);
        }

        let cause = relay(
            self.inbound,
            outbound,
            self.options,
            Arc::clone(&self.log),
            Arc::clone(&self.stats),
        )
        .await;

        SessionOutcome::Closed(SessionSummary {
            upstream,
            bytes_sent: self.stats.bytes_sent(),
            bytes_received: self.stats.bytes_received(),
            cause,
        })
    }
}

/// Run both copy directions between `inbound` and `outbound` until the first
/// one terminates, then close both connections.
pub async fn relay<A, B>(
    inbound: A,
    outbound: B,
    options: RelayOptions,
    log: Arc<dyn SessionLogger>,
    stats: Arc<SessionStats>,
) -> TerminationKind
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let termination = Arc::new(Termination::new());
    let (inbound_read, inbound_write) = tokio::io::split(inbound);
    let (outbound_read, outbound_write) = tokio::io::split(outbound);

    let pipe = |direction| {
        Pipe::new(
            direction,
            options.buffer_size,
            options.hex_output,
            Arc::clone(&log),
            Arc::clone(&stats),
            Arc::clone(&termination),
        )
    };

    let upstream = tokio::spawn(pipe(Direction::Upstream).run(inbound_read, outbound_write));
    let downstream = tokio::spawn(pipe(Direction::Downstream).run(outbound_read, inbound_write));

    let cause = termination.wait().await.kind();

    // Both halves of each connection live inside the copy tasks. Stopping the
    // tasks drops them, which closes the sockets exactly once.
    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;

    log.info(format_args!(
        "Closed ({} bytes sent, {} bytes received)",
        stats.bytes_sent(),
        stats.bytes_received()
    ));

    cause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NullLogger;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_relay_moves_both_directions() {
        let (client, inbound) = duplex(1024);
        let (outbound, upstream) = duplex(1024);
        let stats = Arc::new(SessionStats::new());

        let relay_task = tokio::spawn(relay(
            inbound,
            outbound,
            RelayOptions::default(),
            Arc::new(NullLogger),
            Arc::clone(&stats),
        ));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

        client_write.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        upstream_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        upstream_write.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        // Upstream goes away: the whole session ends
        drop(upstream_read);
        drop(upstream_write);

        let cause = relay_task.await.unwrap();
        assert_eq!(cause, TerminationKind::EndOfStream);
        assert_eq!(stats.bytes_sent(), 4);
        assert_eq!(stats.bytes_received(), 5);

        // Client side was closed by the relay
        let mut rest = Vec::new();
        assert_eq!(client_read.read_to_end(&mut rest).await.unwrap(), 0);
    }

    struct Untunable;

    impl SocketTuning for Untunable {}

    #[test]
    fn test_default_tuning_is_unsupported() {
        let err = Untunable.set_nodelay(true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
