//! Connection registry and message plumbing for one Arena session.
//!
//! A [`Server`] is owned by exactly one room. It binds a transport, wraps
//! every accepted connection in a [`Client`] with a compact [`ClientId`],
//! decodes inbound frames into a queue the room drains once per tick, and
//! fans encoded envelopes back out.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room (above)      ← drains inbound packets and lifecycle notices, sends envelopes
//!     ↕
//! Server (this crate) ← client registry, inbound queue, codec
//!     ↕
//! Transport (below) ← accepts connections, moves byte frames
//! ```
//!
//! [`ClientId`]: arena_protocol::ClientId

mod client;
mod config;
mod error;
mod server;

pub use client::Client;
pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{Inbound, Server, ServerNotice};
