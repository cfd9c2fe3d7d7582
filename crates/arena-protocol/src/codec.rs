//! Codec trait and implementations for turning envelopes into bytes.
//!
//! A "codec" (coder/decoder) converts between [`Envelope`] and raw bytes.
//! Servers take the codec as a constructor parameter, so which wire format
//! a server speaks is configuration, not part of the server's type.

use crate::{Envelope, ProtocolError};

/// A stateless, shareable envelope codec.
///
/// `Send + Sync + 'static` because one codec is shared by a server's
/// connection reader tasks (decode) and its room's flush step (encode).
pub trait Codec: Send + Sync + 'static {
    /// Serializes an envelope into one wire frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] only if the format cannot
    /// represent the payload; never for envelopes produced by `decode`.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one wire frame into an envelope.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedPacket`] if the bytes are not a
    /// valid envelope (bad syntax, missing `events`, `eventCode` or `data`).
    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable, easy to inspect in browser DevTools.
///
/// ## Example
///
/// ```rust
/// use arena_protocol::{Codec, Envelope, JsonCodec, Packet};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::single(Packet {
///     event_code: 1,
///     data: serde_json::json!({ "word": "cat" }),
///     timestamp: 5000,
/// });
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(envelope).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::MalformedPacket)
    }
}
