//! Transport abstraction layer for Arena.
//!
//! Provides the [`Transport`] and [`Connection`] traits that an Arena
//! server binds to. A transport owns a listening resource and hands out
//! connections; a connection moves opaque byte frames in both directions.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `testing`: in-memory [`testing::MockConnection`] / [`testing::MockTransport`]

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

mod error;
#[cfg(feature = "testing")]
pub mod testing;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

/// Opaque transport-level identifier for a connection.
///
/// Distinct from the compact client id a server assigns: this one is
/// never reused for the lifetime of the process and is only used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Binds a listening resource and accepts new incoming connections.
///
/// Futures are required to be `Send` so the accept loop can run on any
/// worker thread of the runtime.
pub trait Transport: Sized + Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Binds a new listener to `addr` (`host:port`).
    ///
    /// Fails if the address is unavailable, e.g. the port is already in use.
    fn bind(
        addr: &str,
    ) -> impl Future<Output = Result<Self, Self::Error>> + Send;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(
        &self,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The address the listener is actually bound to.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// A single connection that can send and receive byte frames.
///
/// `send` and `recv` may be called concurrently from different tasks.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
