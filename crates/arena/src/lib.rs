//! # Arena
//!
//! Tick-driven multiplayer session host.
//!
//! A [`GameMaster`] creates sessions on demand. Each session is one room
//! with its own server on its own port: clients connect over the
//! transport, their packets are queued, and once per tick the room routes
//! them to the game's handlers, runs the game's simulation step, and
//! flushes every queued reply as one envelope per client.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arena::prelude::*;
//!
//! // Implement GameRoom for your game, then:
//! // let master = GameMaster::builder()
//! //     .port_range(30000..=30099)
//! //     .build::<MyGame, _>(config, |server_config| {
//! //         Server::<WebSocketTransport, _>::new(server_config, JsonCodec)
//! //     });
//! // let session_id = master.create_session().await?;
//! ```

mod config;
mod error;
mod master;
mod ports;

pub use config::MasterConfig;
pub use error::{ArenaError, MasterError};
pub use master::{GameMaster, GameMasterBuilder, ServerFactory};
pub use ports::PortPool;

pub use arena_protocol as protocol;
pub use arena_room as room;
pub use arena_server as server;
pub use arena_tick as tick;
pub use arena_transport as transport;

/// Installs a `tracing` subscriber that reads its filter from `RUST_LOG`,
/// falling back to `info`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{ArenaError, GameMaster, GameMasterBuilder, MasterConfig, MasterError};
    pub use arena_protocol::{ClientId, Codec, Envelope, JsonCodec, Packet, SessionId};
    pub use arena_room::{
        EventMap, GameRoom, Handlers, Incoming, RoomConfig, RoomContext, RoomError, RoomState,
    };
    pub use arena_server::{Server, ServerConfig};
    pub use arena_tick::{TickInfo, TickPolicy};
    pub use arena_transport::{Transport, WebSocketTransport};
}
