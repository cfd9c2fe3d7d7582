//! Error types for the protocol layer.
//!
//! Each crate in Arena defines its own error enum. When you see a
//! `ProtocolError`, the problem is in serialization, not in networking or
//! room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The bytes could not be parsed into an envelope.
    ///
    /// Common causes: malformed JSON, missing `events`, an entry without
    /// `eventCode` or `data`, or a truncated frame.
    #[error("malformed packet: {0}")]
    MalformedPacket(#[source] serde_json::Error),

    /// Serialization failed (turning an envelope into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}
