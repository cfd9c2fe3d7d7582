//! The game master: creates sessions, owns their rooms, and hands out
//! ports.
//!
//! Every session is one room on its own port. The master never holds a lock
//! across a room start or stop, so sessions can be created and stopped
//! concurrently from any task.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::RangeInclusive;
use std::time::Duration;

use arena_protocol::{Codec, SessionId};
use arena_room::{GameRoom, Room, RoomConfig, RoomError, RoomHandle, RoomState};
use arena_server::{Server, ServerConfig, ServerError};
use arena_transport::Transport;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::join_all;
use rand::Rng;
use tokio::sync::Mutex;

use crate::{MasterConfig, MasterError, PortPool};

/// Builds the server for a new session.
///
/// Implemented for any `Fn(ServerConfig) -> Server<T, C>`, so a closure
/// is usually enough:
///
/// ```rust,ignore
/// let factory = |config| Server::<WebSocketTransport, _>::new(config, JsonCodec);
/// ```
pub trait ServerFactory: Send + Sync + 'static {
    type Transport: Transport;
    type Codec: Codec;

    fn build(&self, config: ServerConfig) -> Server<Self::Transport, Self::Codec>;
}

impl<F, T, C> ServerFactory for F
where
    F: Fn(ServerConfig) -> Server<T, C> + Send + Sync + 'static,
    T: Transport,
    C: Codec,
{
    type Transport = T;
    type Codec = C;

    fn build(&self, config: ServerConfig) -> Server<T, C> {
        self(config)
    }
}

struct Session {
    port: u16,
    handle: RoomHandle,
}

/// 16 random bytes, base64.
fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    SessionId::new(STANDARD.encode(bytes))
}

async fn stop_session_room(id: SessionId, session: Session) -> (SessionId, Result<(), RoomError>) {
    (id, session.handle.stop().await)
}

/// Builder for a [`GameMaster`].
///
/// ```rust,ignore
/// let master = GameMaster::builder()
///     .host("127.0.0.1")
///     .port_range(30000..=30099)
///     .tick_rate(20)
///     .build::<Crocodile, _>(CrocodileConfig::default(), factory);
/// ```
pub struct GameMasterBuilder {
    config: MasterConfig,
}

impl GameMasterBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MasterConfig::default(),
        }
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: MasterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the interface session servers bind to.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the ports sessions may use.
    pub fn port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.config.port_range = range;
        self
    }

    /// Sets the room configuration for every session.
    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    /// Sets the tick rate of every session's room.
    pub fn tick_rate(mut self, tick_rate: u32) -> Self {
        self.config.room.tick_rate = tick_rate;
        self
    }

    pub fn build<G: GameRoom, F: ServerFactory>(
        self,
        game_config: G::Config,
        factory: F,
    ) -> GameMaster<G, F> {
        GameMaster::new(self.config, game_config, factory)
    }
}

impl Default for GameMasterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns every live session of one game type.
pub struct GameMaster<G: GameRoom, F: ServerFactory> {
    config: MasterConfig,
    game_config: G::Config,
    factory: F,
    sessions: Mutex<HashMap<SessionId, Session>>,
    ports: Mutex<PortPool>,
    _game: PhantomData<fn() -> G>,
}

impl<G: GameRoom, F: ServerFactory> GameMaster<G, F> {
    pub fn new(config: MasterConfig, game_config: G::Config, factory: F) -> Self {
        let ports = PortPool::new(config.port_range.clone());
        Self {
            config,
            game_config,
            factory,
            sessions: Mutex::new(HashMap::new()),
            ports: Mutex::new(ports),
            _game: PhantomData,
        }
    }

    pub fn builder() -> GameMasterBuilder {
        GameMasterBuilder::new()
    }

    /// Creates a session and starts its room.
    ///
    /// A port that fails to bind (held outside the pool) is skipped and the
    /// next free one is tried; skipped ports go back to the pool afterwards.
    ///
    /// # Errors
    /// - [`MasterError::DuplicateSession`] if the generated id is taken
    /// - [`MasterError::NoAvailablePorts`] if the port range is exhausted
    /// - [`MasterError::Room`] if the room cannot start, or if every free
    ///   port failed to bind; the ports go back to the pool
    pub async fn create_session(&self) -> Result<SessionId, MasterError> {
        let session_id = generate_session_id();
        if self.sessions.lock().await.contains_key(&session_id) {
            return Err(MasterError::DuplicateSession(session_id));
        }

        let mut occupied = Vec::new();
        let started = self.start_room(&session_id, &mut occupied).await;
        if !occupied.is_empty() {
            let mut ports = self.ports.lock().await;
            for port in &occupied {
                ports.release(*port);
            }
        }
        let (port, handle) = started?;

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session_id) {
            drop(sessions);
            if let Err(e) = handle.stop().await {
                tracing::warn!(session_id = %session_id, error = %e, "failed to stop duplicate session");
            }
            self.ports.lock().await.release(port);
            return Err(MasterError::DuplicateSession(session_id));
        }
        sessions.insert(session_id.clone(), Session { port, handle });
        drop(sessions);

        tracing::info!(session_id = %session_id, port, "session created");
        Ok(session_id)
    }

    /// Allocates ports until one binds. Ports that failed to bind are
    /// pushed to `occupied` and stay allocated until the caller frees them.
    async fn start_room(
        &self,
        session_id: &SessionId,
        occupied: &mut Vec<u16>,
    ) -> Result<(u16, RoomHandle), MasterError> {
        let events = G::event_map()?;
        let mut last_bind_error = None;

        loop {
            let Some(port) = self.ports.lock().await.allocate() else {
                return Err(match last_bind_error {
                    Some(e) => MasterError::Room(e),
                    None => MasterError::NoAvailablePorts {
                        range: self.config.port_range.clone(),
                    },
                });
            };

            let server = self
                .factory
                .build(ServerConfig::new(self.config.host.clone(), port));
            let game = G::new(&self.game_config, session_id);
            let room = Room::new(
                server,
                session_id.clone(),
                self.config.room.clone(),
                events.clone(),
                game,
            );

            match room.start().await {
                Ok(handle) => return Ok((port, handle)),
                Err(e @ RoomError::Server(ServerError::Bind { .. })) => {
                    tracing::warn!(session_id = %session_id, port, error = %e, "port occupied outside the pool, trying the next one");
                    occupied.push(port);
                    last_bind_error = Some(e);
                }
                Err(e) => {
                    self.ports.lock().await.release(port);
                    tracing::error!(session_id = %session_id, port, error = %e, "session failed to start");
                    return Err(e.into());
                }
            }
        }
    }

    /// Stops one session's room and frees its port.
    ///
    /// # Errors
    /// - [`MasterError::SessionNotFound`] for an unknown id
    /// - [`MasterError::Room`] if the room failed to stop cleanly; the port
    ///   is released anyway
    pub async fn stop_session(&self, session_id: &SessionId) -> Result<(), MasterError> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| MasterError::SessionNotFound(session_id.clone()))?;

        let port = session.port;
        let result = session.handle.stop().await;
        self.ports.lock().await.release(port);

        match result {
            Ok(()) => {
                tracing::info!(session_id = %session_id, port, "session stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, port, error = %e, "session stopped with error");
                Err(e.into())
            }
        }
    }

    /// Stops every session concurrently, then frees their ports.
    ///
    /// Sessions created while the stop is in flight keep running and keep
    /// their ports.
    ///
    /// One session failing never keeps the others running.
    ///
    /// # Errors
    /// [`MasterError::Shutdown`] listing the sessions that failed.
    pub async fn stop(&self) -> Result<(), MasterError> {
        let sessions: Vec<(SessionId, Session)> = self.sessions.lock().await.drain().collect();
        let count = sessions.len();
        let ports: Vec<u16> = sessions.iter().map(|(_, session)| session.port).collect();

        let mut stops = Vec::with_capacity(count);
        for (id, session) in sessions {
            stops.push(stop_session_room(id, session));
        }

        let mut failed = Vec::new();
        for (id, result) in join_all(stops).await {
            if let Err(e) = result {
                tracing::error!(session_id = %id, error = %e, "failed to stop session");
                failed.push(id);
            }
        }
        {
            let mut pool = self.ports.lock().await;
            for port in ports {
                pool.release(port);
            }
        }

        tracing::info!(sessions = count, failed = failed.len(), "game master stopped");
        if failed.is_empty() {
            Ok(())
        } else {
            Err(MasterError::Shutdown { failed })
        }
    }

    /// [`stop`](Self::stop), bounded by `timeout`.
    ///
    /// # Errors
    /// [`MasterError::ShutdownTimeout`] if the deadline passed first, or
    /// whatever `stop` returned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), MasterError> {
        match tokio::time::timeout(timeout, self.stop()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout = ?timeout, "shutdown timed out");
                Err(MasterError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Forgets sessions whose room closed on its own and frees their ports.
    ///
    /// Returns the ids that were removed.
    pub async fn reap_closed(&self) -> Vec<SessionId> {
        let closed: Vec<(SessionId, Session)> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, session)| session.handle.is_closed())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|session| (id, session)))
                .collect()
        };

        let mut reaped = Vec::with_capacity(closed.len());
        for (id, session) in closed {
            let port = session.port;
            if let Err(e) = session.handle.stop().await {
                tracing::warn!(session_id = %id, error = %e, "closed session ended with error");
            }
            self.ports.lock().await.release(port);
            tracing::info!(session_id = %id, port, "reaped closed session");
            reaped.push(id);
        }
        reaped
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn session_state(&self, session_id: &SessionId) -> Option<RoomState> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|session| session.handle.state())
    }

    /// The port a live session's server listens on.
    pub async fn port_of(&self, session_id: &SessionId) -> Option<u16> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|session| session.port)
    }

    /// Ports still free for new sessions.
    pub async fn available_ports(&self) -> usize {
        self.ports.lock().await.available()
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }
}
