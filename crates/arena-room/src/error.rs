//! Error types for the room layer.

use arena_protocol::SessionId;
use arena_server::ServerError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The event table maps a code or an event twice.
    #[error("invalid event map: {0}")]
    InvalidEventMap(String),

    /// A send named an event that has no code in the room's event map.
    #[error("event {0} has no code in the event map")]
    UnmappedEvent(String),

    /// A payload could not be converted to or from JSON.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// The room's server failed (bind, shutdown, encode).
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A game-specific failure raised by a handler or tick.
    #[error("{0}")]
    Game(String),

    /// The room's actor task panicked.
    #[error("room {0} panicked")]
    Panicked(SessionId),
}
