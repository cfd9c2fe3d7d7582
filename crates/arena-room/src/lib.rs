//! Tick-driven game rooms for Arena.
//!
//! Each room owns one server and runs as an isolated Tokio task (actor
//! model). On every scheduled firing it dispatches the packets its clients
//! sent since the previous firing, runs the game's simulation step, and
//! flushes everything the game queued as one envelope per client.
//!
//! # Key types
//!
//! - [`GameRoom`]: the trait game developers implement
//! - [`Room`]: a game, its server, and its event map, ready to start
//! - [`RoomHandle`]: observe and stop a running room
//! - [`RoomContext`]: what handlers use to reply
//! - [`EventMap`]: wire codes ↔ event names
//! - [`RoomState`]: lifecycle state machine

mod config;
mod context;
mod error;
mod events;
mod logic;
mod room;

pub use config::{RoomConfig, RoomState};
pub use context::{Incoming, RoomContext};
pub use error::RoomError;
pub use events::EventMap;
pub use logic::{GameRoom, Handler, Handlers};
pub use room::{Room, RoomHandle};
