//! Error types for the game master, plus the unified error for the Arena
//! framework.

use std::ops::RangeInclusive;
use std::time::Duration;

use arena_protocol::{ProtocolError, SessionId};
use arena_room::RoomError;
use arena_server::ServerError;
use arena_transport::TransportError;

/// Errors raised by [`GameMaster`](crate::GameMaster) operations.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    /// A freshly generated session id collides with a live session.
    #[error("session {0} already exists")]
    DuplicateSession(SessionId),

    /// Every port of the configured range is held by a live session.
    #[error("no available ports in {}..={}", .range.start(), .range.end())]
    NoAvailablePorts { range: RangeInclusive<u16> },

    /// No live session has this id.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// Starting or stopping a session's room failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// `stop` finished, but these sessions failed to stop cleanly.
    #[error("{} session(s) failed to stop", .failed.len())]
    Shutdown { failed: Vec<SessionId> },

    /// `shutdown` did not finish within its deadline.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `arena` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A server-level error (bind, invariant violations).
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A room-level error (event map, payload, handler).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A game-master error (ports, sessions, shutdown).
    #[error(transparent)]
    Master(#[from] MasterError),
}
