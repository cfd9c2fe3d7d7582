//! Wire protocol for Arena.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Types** ([`Envelope`], [`Packet`], [`ClientId`], [`SessionId`]):
//!   the structures that travel on the wire and the ids that name their
//!   endpoints.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Server (inbound queue) → Room
//! ```
//!
//! The protocol layer doesn't know about connections or rooms. It only
//! knows how to serialize and deserialize envelopes.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{ClientId, Envelope, Packet, SessionId, now_millis};
