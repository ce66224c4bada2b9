//! Single-fire Termination Signal
//!
//! Both copy tasks of a session race to report the end of the relay. Only the
//! first report is delivered; later ones are dropped.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tokio::sync::Notify;

use super::pipe::Direction;

/// Why a copy task stopped
#[derive(Debug)]
pub enum TerminationCause {
    /// Orderly end-of-stream on the source of `direction`
    EndOfStream(Direction),
    /// Reading from the source failed
    ReadFailed { direction: Direction, error: io::Error },
    /// Writing to the destination failed
    WriteFailed { direction: Direction, error: io::Error },
}

impl TerminationCause {
    /// Direction of the copy task that reported this cause
    pub fn direction(&self) -> Direction {
        match self {
            Self::EndOfStream(direction) => *direction,
            Self::ReadFailed { direction, .. } | Self::WriteFailed { direction, .. } => *direction,
        }
    }

    /// End-of-stream is an expected way for a session to finish
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream(_))
    }

    pub fn kind(&self) -> TerminationKind {
        match self {
            Self::EndOfStream(_) => TerminationKind::EndOfStream,
            Self::ReadFailed { .. } => TerminationKind::ReadFailed,
            Self::WriteFailed { .. } => TerminationKind::WriteFailed,
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream(direction) => write!(f, "{} source closed", direction),
            Self::ReadFailed { error, .. } => write!(f, "Read failed: {}", error),
            Self::WriteFailed { error, .. } => write!(f, "Write failed: {}", error),
        }
    }
}

/// Copyable summary of a [`TerminationCause`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    EndOfStream,
    ReadFailed,
    WriteFailed,
}

/// At-most-once termination signal shared by the two copy tasks of a session
#[derive(Debug, Default)]
pub struct Termination {
    fired: AtomicBool,
    cause: OnceLock<TerminationCause>,
    notify: Notify,
}

impl Termination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver the termination signal.
    ///
    /// Returns `true` only for the caller whose report was delivered; every
    /// later call is a no-op returning `false`.
    pub fn fire(&self, cause: TerminationCause) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // The flag admits a single caller, so the cell is always empty here
        let _ = self.cause.set(cause);
        // notify_one stores a permit when nobody is waiting yet
        self.notify.notify_one();
        true
    }

    /// Wait for the signal and return the cause that was delivered
    pub async fn wait(&self) -> &TerminationCause {
        loop {
            if let Some(cause) = self.cause.get() {
                return cause;
            }
            self.notify.notified().await;
        }
    }
}
