//! Data Relay Module
//!
//! Upstream selection and bidirectional data relay for a single connection.

pub mod connector;
pub mod pipe;
pub mod session;
pub mod stats;
pub mod termination;

pub use connector::{EndpointConnector, Endpoints, Upstream};
pub use pipe::{Direction, DEFAULT_BUFFER_SIZE};
pub use session::{relay, RelayOptions, RelaySession, SessionOutcome, SessionSummary, SocketTuning};
pub use stats::SessionStats;
pub use termination::{Termination, TerminationCause, TerminationKind};
