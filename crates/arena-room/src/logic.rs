//! The `GameRoom` trait, the main extension point for game developers.
//!
//! A concrete game implements this once. The framework owns the tick loop,
//! the client registry, and the wire; the game writes handlers for its
//! events and a per-tick simulation step.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use arena_protocol::{ClientId, SessionId};
use arena_tick::TickInfo;

use crate::{EventMap, Incoming, RoomContext, RoomError};

/// A statically known handler for one inbound event.
pub type Handler<G> = fn(
    &mut G,
    &mut RoomContext<<G as GameRoom>::Event>,
    Incoming,
) -> Result<(), RoomError>;

/// The handler table of a room type, keyed by event.
pub struct Handlers<G: GameRoom> {
    map: HashMap<G::Event, Handler<G>>,
}

impl<G: GameRoom> Handlers<G> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registers `handler` for `event`, replacing any earlier one.
    pub fn on(mut self, event: G::Event, handler: Handler<G>) -> Self {
        self.map.insert(event, handler);
        self
    }

    pub fn get(&self, event: G::Event) -> Option<Handler<G>> {
        self.map.get(&event).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<G: GameRoom> Default for Handlers<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// The core trait that game developers implement.
///
/// - `Config`: game-specific settings, shared by every session
/// - `Event`: the closed set of event names the game speaks
///
/// Per firing the room calls, in order: `on_connect` / `on_disconnect` for
/// lifecycle changes, the handler of every queued inbound packet, then
/// `tick`. Whatever the game queued on the context is flushed afterwards.
pub trait GameRoom: Send + Sized + 'static {
    /// Game-specific configuration (word lists, round length, ...).
    type Config: Clone + Send + Sync + 'static;

    /// Symbolic event names; mapped to wire codes by [`GameRoom::event_map`].
    type Event: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Builds the game state for a new session.
    fn new(config: &Self::Config, session_id: &SessionId) -> Self;

    /// The code table for this room type.
    fn event_map() -> Result<EventMap<Self::Event>, RoomError>;

    /// Handlers for inbound events. Events without one are logged and
    /// dropped. Default: none.
    fn handlers() -> Handlers<Self> {
        Handlers::new()
    }

    /// Runs once, before the first scheduled firing. Default: no-op.
    ///
    /// An error here is logged; the room still starts.
    fn first_tick(
        &mut self,
        _ctx: &mut RoomContext<Self::Event>,
    ) -> impl Future<Output = Result<(), RoomError>> + Send {
        async { Ok(()) }
    }

    /// The per-firing simulation step.
    fn tick(
        &mut self,
        ctx: &mut RoomContext<Self::Event>,
        info: &TickInfo,
    ) -> impl Future<Output = Result<(), RoomError>> + Send;

    /// A client registered with the room's server. Default: no-op.
    fn on_connect(&mut self, _ctx: &mut RoomContext<Self::Event>, _client: ClientId) {}

    /// A client left. It is no longer in `ctx.clients()`. Default: no-op.
    fn on_disconnect(&mut self, _ctx: &mut RoomContext<Self::Event>, _client: ClientId) {}
}
