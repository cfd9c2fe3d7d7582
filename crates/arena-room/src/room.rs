//! Room actor: an isolated Tokio task that owns a game instance and its
//! server.
//!
//! Each room runs in its own task. The outside world only holds a
//! [`RoomHandle`], which observes the lifecycle state and asks the actor to
//! stop. Everything the game touches lives inside the actor, so per-room
//! state needs no locks.

use arena_protocol::{Codec, Envelope, SessionId};
use arena_server::{Inbound, Server, ServerNotice};
use arena_tick::{TickInfo, TickScheduler};
use arena_transport::Transport;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::{EventMap, GameRoom, Handlers, Incoming, RoomConfig, RoomContext, RoomError, RoomState};

/// A room that has been assembled but not started.
///
/// ```rust,ignore
/// let server = Server::<WebSocketTransport, _>::new(server_config, JsonCodec);
/// let room = Room::new(server, session_id, RoomConfig::default(), Crocodile::event_map()?, game);
/// let handle = room.start().await?;
/// // ...
/// handle.stop().await?;
/// ```
pub struct Room<G: GameRoom, T: Transport, C: Codec> {
    server: Server<T, C>,
    session_id: SessionId,
    config: RoomConfig,
    events: EventMap<G::Event>,
    game: G,
    state: watch::Sender<RoomState>,
}

impl<G: GameRoom, T: Transport, C: Codec> Room<G, T, C> {
    pub fn new(
        server: Server<T, C>,
        session_id: SessionId,
        config: RoomConfig,
        events: EventMap<G::Event>,
        game: G,
    ) -> Self {
        let (state, _) = watch::channel(RoomState::Created);
        Self {
            server,
            session_id,
            config,
            events,
            game,
            state,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> RoomState {
        *self.state.borrow()
    }

    /// Binds the server and spawns the room's actor task.
    ///
    /// # Errors
    /// [`RoomError::Server`] if the server cannot bind. The room never runs.
    pub async fn start(mut self) -> Result<RoomHandle, RoomError> {
        if let Err(e) = self.server.init().await {
            tracing::error!(session_id = %self.session_id, error = %e, "room failed to start");
            return Err(e.into());
        }
        self.state.send_replace(RoomState::Initialized);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle_state = self.state.subscribe();
        let session_id = self.session_id.clone();

        let ctx = RoomContext::new(self.session_id.clone(), self.events);
        let actor = RoomActor {
            session_id: self.session_id,
            scheduler: TickScheduler::new(self.config.tick_config()),
            server: self.server,
            handlers: G::handlers(),
            game: self.game,
            ctx,
            state: self.state,
        };
        let task = tokio::spawn(actor.run(shutdown_rx));

        Ok(RoomHandle {
            session_id,
            state: handle_state,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a running room actor.
///
/// Dropping the handle without calling [`stop`](Self::stop) also shuts the
/// room down, at the end of the firing in progress.
#[derive(Debug)]
pub struct RoomHandle {
    session_id: SessionId,
    state: watch::Receiver<RoomState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), RoomError>>,
}

impl RoomHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The room's current lifecycle state.
    pub fn state(&self) -> RoomState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Waits until the room reaches `target` or closes.
    pub async fn wait_for(&mut self, target: RoomState) -> RoomState {
        match self
            .state
            .wait_for(|state| *state == target || state.is_closed())
            .await
        {
            Ok(state) => *state,
            Err(_) => RoomState::Closed,
        }
    }

    /// Stops the room and waits for its actor to finish.
    ///
    /// A firing in progress completes first. Then the server is stopped
    /// and the room is `Closed`.
    ///
    /// # Errors
    /// - [`RoomError::Server`] if the server's shutdown failed
    /// - [`RoomError::Panicked`] if the actor panicked
    pub async fn stop(mut self) -> Result<(), RoomError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "room task failed");
                Err(RoomError::Panicked(self.session_id))
            }
        }
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<G: GameRoom, T: Transport, C: Codec> {
    session_id: SessionId,
    server: Server<T, C>,
    scheduler: TickScheduler,
    handlers: Handlers<G>,
    game: G,
    ctx: RoomContext<G::Event>,
    state: watch::Sender<RoomState>,
}

impl<G: GameRoom, T: Transport, C: Codec> RoomActor<G, T, C> {
    /// Runs the actor loop until shutdown or until the game closes itself.
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), RoomError> {
        self.transition(RoomState::Starting);

        self.sync_clients().await;
        if let Err(e) = self.game.first_tick(&mut self.ctx).await {
            tracing::error!(session_id = %self.session_id, error = %e, "first tick failed");
        }
        self.flush().await;

        self.transition(RoomState::Playing);
        tracing::info!(
            session_id = %self.session_id,
            tick_rate = self.scheduler.tick_rate_hz(),
            "room playing"
        );

        while !self.ctx.is_closing() {
            tokio::select! {
                _ = &mut shutdown => break,
                info = self.scheduler.wait_for_tick() => {
                    self.fire(&info).await;
                    self.scheduler.record_tick_end();
                }
            }
        }

        if self.ctx.is_closing() {
            tracing::info!(session_id = %self.session_id, "room closed by game");
        }
        let result = self.server.stop().await;
        self.transition(RoomState::Closed);
        tracing::info!(
            session_id = %self.session_id,
            ticks = self.scheduler.tick_count(),
            budget_exceeded = self.scheduler.metrics().budget_exceeded,
            "room stopped"
        );
        result.map_err(RoomError::from)
    }

    /// One scheduled firing: dispatch, simulate, flush.
    async fn fire(&mut self, info: &TickInfo) {
        self.ctx.set_tick(info.tick);

        let notices = self.server.drain_notices();
        self.sync_clients().await;
        for notice in notices {
            match notice {
                ServerNotice::Connected(client) => self.game.on_connect(&mut self.ctx, client),
                ServerNotice::Disconnected(client) => {
                    self.game.on_disconnect(&mut self.ctx, client)
                }
            }
        }

        for inbound in self.server.drain_inbound() {
            self.route(inbound);
        }

        if let Err(e) = self.game.tick(&mut self.ctx, info).await {
            tracing::error!(session_id = %self.session_id, tick = info.tick, error = %e, "tick failed");
        }

        self.flush().await;
    }

    fn route(&mut self, inbound: Inbound) {
        let code = inbound.packet.event_code;
        let client = inbound.client;

        let Some(event) = self.ctx.events().event(code) else {
            tracing::error!(
                session_id = %self.session_id,
                client_id = %client,
                event_code = code,
                "unmapped event code"
            );
            return;
        };
        let Some(handler) = self.handlers.get(event) else {
            tracing::warn!(
                session_id = %self.session_id,
                client_id = %client,
                ?event,
                "no handler for event"
            );
            return;
        };

        let incoming = Incoming {
            client,
            data: inbound.packet.data,
            received_at: inbound.received_at,
            timestamp: inbound.packet.timestamp,
        };
        if let Err(e) = handler(&mut self.game, &mut self.ctx, incoming) {
            tracing::warn!(
                session_id = %self.session_id,
                client_id = %client,
                ?event,
                error = %e,
                "handler failed"
            );
        }
    }

    /// Sends each client's queued packets as one envelope.
    async fn flush(&mut self) {
        for (client, events) in self.ctx.take_outbox() {
            if !self.server.is_registered(client).await {
                tracing::debug!(
                    session_id = %self.session_id,
                    client_id = %client,
                    discarded = events.len(),
                    "client gone, discarding outbound"
                );
                continue;
            }
            let envelope = Envelope::new(events);
            if let Err(e) = self.server.send_to_client(&envelope, client).await {
                tracing::error!(
                    session_id = %self.session_id,
                    client_id = %client,
                    error = %e,
                    "failed to send envelope"
                );
            }
        }
    }

    async fn sync_clients(&mut self) {
        let clients = self.server.client_ids().await;
        self.ctx.set_clients(clients);
    }

    fn transition(&self, next: RoomState) {
        let current = *self.state.borrow();
        if !current.can_transition_to(next) {
            tracing::warn!(
                session_id = %self.session_id,
                from = %current,
                to = %next,
                "unexpected room state transition"
            );
        }
        self.state.send_replace(next);
        tracing::debug!(session_id = %self.session_id, state = %next, "room state changed");
    }
}
