//! Error types for the server layer.

use arena_protocol::{ClientId, ProtocolError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while running a session's server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding the transport failed. The session cannot start.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: BoxError,
    },

    /// `init` was called on a server that is already listening.
    #[error("server already initialized")]
    AlreadyInitialized,

    /// The id chosen for a new connection is already registered.
    ///
    /// Ids are allocated from the registry itself, so this is a defect,
    /// never a client mistake.
    #[error("client id {0} is already registered")]
    DuplicateClient(ClientId),

    /// Encoding an outbound envelope failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Shutting the transport down failed.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}
