//! Directional Copy Task
//!
//! Moves bytes from one side of a session to the other until the source ends
//! or either side fails, then reports to the session's termination signal.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::stats::SessionStats;
use super::termination::{Termination, TerminationCause};
use crate::logger::SessionLogger;

/// Default copy buffer size (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Which way a copy task moves bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to upstream; counted as sent
    Upstream,
    /// Upstream to client; counted as received
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "client"),
            Direction::Downstream => write!(f, "upstream"),
        }
    }
}

/// One half of a bidirectional relay
pub struct Pipe {
    direction: Direction,
    buffer_size: usize,
    hex_output: bool,
    log: Arc<dyn SessionLogger>,
    stats: Arc<SessionStats>,
    termination: Arc<Termination>,
}

impl Pipe {
    pub fn new(
        direction: Direction,
        buffer_size: usize,
        hex_output: bool,
        log: Arc<dyn SessionLogger>,
        stats: Arc<SessionStats>,
        termination: Arc<Termination>,
    ) -> Self {
        Self {
            direction,
            buffer_size: buffer_size.max(1),
            hex_output,
            log,
            stats,
            termination,
        }
    }

    /// Copy from `src` to `dst` until something stops the loop.
    ///
    /// Each read is written out in full before the next read starts. The
    /// counter for this direction only grows after a write succeeds.
    pub async fn run<R, W>(self, mut src: R, mut dst: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let n = match src.read(&mut buf).await {
                Ok(0) => {
                    self.report(TerminationCause::EndOfStream(self.direction));
                    return;
                }
                Ok(n) => n,
                Err(error) => {
                    self.report(TerminationCause::ReadFailed {
                        direction: self.direction,
                        error,
                    });
                    return;
                }
            };
            let data = &buf[..n];

            match self.direction {
                Direction::Upstream => self.log.debug(format_args!(">>> {} bytes sent", n)),
                Direction::Downstream => self.log.debug(format_args!("<<< {} bytes received", n)),
            }
            if self.log.trace_enabled() {
                self.log.trace(format_args!("{}", render(data, self.hex_output)));
            }

            if let Err(error) = dst.write_all(data).await {
                self.report(TerminationCause::WriteFailed {
                    direction: self.direction,
                    error,
                });
                return;
            }
            self.stats.record(self.direction, n);
        }
    }

    /// Hand `cause` to the session. Only the first reporter of a session is
    /// delivered, and only its failures are logged.
    fn report(&self, cause: TerminationCause) {
        let warning = (!cause.is_end_of_stream()).then(|| cause.to_string());
        if self.termination.fire(cause) {
            if let Some(warning) = warning {
                self.log.warn(format_args!("{}", warning));
            }
        }
    }
}

/// Render relayed bytes for trace output
pub fn render(data: &[u8], hex_output: bool) -> String {
    if hex_output {
        hex::encode(data)
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}
