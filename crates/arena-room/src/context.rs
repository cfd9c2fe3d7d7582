//! What a room's hooks and handlers see: the incoming packet, and a
//! context for queueing replies.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

use arena_protocol::{ClientId, Packet, SessionId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::{EventMap, RoomError};

/// A routed packet, as handed to an event handler.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub client: ClientId,
    pub data: serde_json::Value,
    /// When the server decoded the frame carrying this packet.
    pub received_at: Instant,
    /// The sender's wall clock stamp, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Incoming {
    /// Deserializes the payload into the handler's message type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RoomError> {
        Ok(T::deserialize(&self.data)?)
    }
}

/// Per-client queues of packets waiting for the end-of-tick flush.
///
/// Each client's entries keep their enqueue order; the flush turns one
/// client's queue into one envelope.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    queues: BTreeMap<ClientId, Vec<Packet>>,
}

impl Outbox {
    pub(crate) fn push(&mut self, client: ClientId, packet: Packet) {
        self.queues.entry(client).or_default().push(packet);
    }

    pub(crate) fn take(&mut self) -> BTreeMap<ClientId, Vec<Packet>> {
        std::mem::take(&mut self.queues)
    }

    pub(crate) fn pending(&self, client: ClientId) -> &[Packet] {
        self.queues.get(&client).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Handed to every hook and handler of a running room.
///
/// Sends are never immediate: they append to the room's outbox and go out
/// together when the current firing flushes.
pub struct RoomContext<E> {
    session_id: SessionId,
    events: EventMap<E>,
    outbox: Outbox,
    clients: Vec<ClientId>,
    tick: u64,
    close_requested: bool,
}

impl<E: Copy + Eq + Hash + Debug> RoomContext<E> {
    /// A context with no clients, before the first tick.
    ///
    /// Rooms build their own; games construct one directly to exercise
    /// handlers without a server.
    pub fn new(session_id: SessionId, events: EventMap<E>) -> Self {
        Self {
            session_id,
            events,
            outbox: Outbox::default(),
            clients: Vec::new(),
            tick: 0,
            close_requested: false,
        }
    }

    /// Replaces the known client list.
    pub fn with_clients(mut self, clients: Vec<ClientId>) -> Self {
        self.clients = clients;
        self
    }

    /// Queues `payload` as `event` for one client.
    ///
    /// # Errors
    /// - [`RoomError::UnmappedEvent`] if `event` has no code
    /// - [`RoomError::Payload`] if `payload` does not serialize
    pub fn send(
        &mut self,
        event: E,
        payload: impl Serialize,
        client: ClientId,
    ) -> Result<(), RoomError> {
        let packet = self.packet(event, payload)?;
        self.outbox.push(client, packet);
        Ok(())
    }

    /// Queues `payload` as `event` for every registered client not in
    /// `excluded`.
    pub fn send_to_all(
        &mut self,
        event: E,
        payload: impl Serialize,
        excluded: &[ClientId],
    ) -> Result<(), RoomError> {
        let packet = self.packet(event, payload)?;
        for client in &self.clients {
            if !excluded.contains(client) {
                self.outbox.push(*client, packet.clone());
            }
        }
        Ok(())
    }

    fn packet(&self, event: E, payload: impl Serialize) -> Result<Packet, RoomError> {
        let code = self
            .events
            .code(event)
            .ok_or_else(|| RoomError::UnmappedEvent(format!("{event:?}")))?;
        Ok(Packet::new(code, serde_json::to_value(payload)?))
    }

    /// Clients registered at the start of the current firing, ascending.
    pub fn clients(&self) -> &[ClientId] {
        &self.clients
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The number of the current firing; 0 during `first_tick`.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn events(&self) -> &EventMap<E> {
        &self.events
    }

    /// Asks the room to shut itself down once the current firing ends.
    pub fn close(&mut self) {
        self.close_requested = true;
    }

    pub fn is_closing(&self) -> bool {
        self.close_requested
    }

    /// Packets queued for `client` that have not been flushed yet.
    pub fn pending(&self, client: ClientId) -> &[Packet] {
        self.outbox.pending(client)
    }

    pub(crate) fn set_clients(&mut self, clients: Vec<ClientId>) {
        self.clients = clients;
    }

    pub(crate) fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub(crate) fn take_outbox(&mut self) -> BTreeMap<ClientId, Vec<Packet>> {
        self.outbox.take()
    }
}
