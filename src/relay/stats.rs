//! Session Byte Counters

use std::sync::atomic::{AtomicU64, Ordering};

use super::pipe::Direction;

/// Byte counters for one relay session.
///
/// Each counter has exactly one writer: the copy task moving bytes in that
/// direction. The session only reads them.
#[derive(Debug, Default)]
pub struct SessionStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl SessionStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written to the upstream (client to upstream)
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Bytes written to the client (upstream to client)
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Get total bytes transferred
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent() + self.bytes_received()
    }

    /// Add a successful write to the counter owned by `direction`
    pub fn record(&self, direction: Direction, bytes: usize) {
        let counter = match direction {
            Direction::Upstream => &self.bytes_sent,
            Direction::Downstream => &self.bytes_received,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}
