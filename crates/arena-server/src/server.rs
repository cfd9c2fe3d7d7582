//! The session server: binds a transport, registers clients, queues their
//! packets, and fans envelopes back out.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arena_protocol::{ClientId, Codec, Envelope, Packet};
use arena_transport::{Connection, Transport};
use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{Client, ServerConfig, ServerError};

/// A packet received from a client, waiting to be routed by the room.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub packet: Packet,
    pub client: ClientId,
    /// When the frame carrying this packet was decoded.
    pub received_at: Instant,
}

/// Client lifecycle changes, delivered to the room between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerNotice {
    Connected(ClientId),
    Disconnected(ClientId),
}

/// State shared between the server handle, the accept loop, and every
/// client reader task.
pub(crate) struct Shared<K: Connection, C: Codec> {
    clients: RwLock<BTreeMap<ClientId, Arc<Client<K>>>>,
    codec: C,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    notices_tx: mpsc::UnboundedSender<ServerNotice>,
    /// Cleared by `stop`; no notices or inbound packets after that.
    listening: AtomicBool,
}

impl<K: Connection, C: Codec> Shared<K, C> {
    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    async fn connection(self: &Arc<Self>, conn: K) -> Result<ClientId, ServerError> {
        let mut clients = self.clients.write().await;

        let id = smallest_free_id(&clients);
        if clients.contains_key(&id) {
            tracing::error!(client = %id, "allocated client id is already registered");
            return Err(ServerError::DuplicateClient(id));
        }

        // Registered before the write lock is released, so a reader that
        // ends immediately still finds itself in the registry.
        let client = Client::spawn(id, conn, Arc::downgrade(self));
        let conn_id = client.connection_id();
        clients.insert(id, client);

        tracing::info!(client = %id, connection = %conn_id, "client joined");
        let _ = self.notices_tx.send(ServerNotice::Connected(id));
        Ok(id)
    }

    pub(crate) fn on_client_data(&self, id: ClientId, frame: &[u8]) {
        if !self.is_listening() {
            return;
        }
        let envelope = match self.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(client = %id, error = %e, "dropping undecodable frame");
                return;
            }
        };

        let received_at = Instant::now();
        for packet in envelope.events {
            let _ = self.inbound_tx.send(Inbound {
                packet,
                client: id,
                received_at,
            });
        }
    }

    pub(crate) async fn on_disconnect(&self, id: ClientId) {
        if !self.is_listening() {
            return;
        }
        let mut clients = self.clients.write().await;
        if clients.remove(&id).is_none() {
            tracing::debug!(client = %id, "disconnect for unregistered client");
            return;
        }
        tracing::info!(client = %id, "client left");
        let _ = self.notices_tx.send(ServerNotice::Disconnected(id));
    }

    async fn targets(&self, filter: impl Fn(ClientId) -> bool) -> Vec<Arc<Client<K>>> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|(id, _)| filter(**id))
            .map(|(_, client)| Arc::clone(client))
            .collect()
    }
}

/// Ids start at 1; the first gap in the sorted registry wins.
fn smallest_free_id<V>(clients: &BTreeMap<ClientId, V>) -> ClientId {
    let mut candidate = 1;
    for id in clients.keys() {
        if id.0 != candidate {
            break;
        }
        candidate += 1;
    }
    ClientId(candidate)
}

async fn tagged_send<K: Connection>(
    client: &Client<K>,
    frame: &[u8],
) -> (ClientId, Result<(), K::Error>) {
    (client.id(), client.send(frame).await)
}

async fn tagged_close<K: Connection>(client: &Client<K>) -> (ClientId, Result<(), K::Error>) {
    (client.id(), client.close().await)
}

async fn deliver<K: Connection>(targets: &[Arc<Client<K>>], frame: &[u8]) {
    let mut sends = Vec::with_capacity(targets.len());
    for client in targets {
        sends.push(tagged_send(client, frame));
    }
    for (id, result) in join_all(sends).await {
        if let Err(e) = result {
            tracing::warn!(client = %id, error = %e, "send failed");
        }
    }
}

struct Acceptor<E> {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), E>>,
}

/// The network side of one game session.
///
/// Owned by a single room. The room drives it from its actor task: it
/// drains inbound packets and notices once per tick and sends envelopes
/// back through it.
///
/// # Example
///
/// ```rust,ignore
/// let mut server = Server::<WebSocketTransport, _>::new(config, JsonCodec);
/// server.init().await?;
/// for inbound in server.drain_inbound() {
///     // route inbound.packet
/// }
/// server.broadcast(&envelope).await?;
/// server.stop().await?;
/// ```
pub struct Server<T: Transport, C: Codec> {
    config: ServerConfig,
    shared: Arc<Shared<T::Connection, C>>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    notices_rx: mpsc::UnboundedReceiver<ServerNotice>,
    acceptor: Option<Acceptor<T::Error>>,
    local_addr: Option<SocketAddr>,
    initialized: bool,
    _transport: PhantomData<fn() -> T>,
}

impl<T: Transport, C: Codec> Server<T, C> {
    pub fn new(config: ServerConfig, codec: C) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            clients: RwLock::new(BTreeMap::new()),
            codec,
            inbound_tx,
            notices_tx,
            listening: AtomicBool::new(false),
        });
        Self {
            config,
            shared,
            inbound_rx,
            notices_rx,
            acceptor: None,
            local_addr: None,
            initialized: false,
            _transport: PhantomData,
        }
    }

    /// Binds the transport and starts accepting connections.
    ///
    /// # Errors
    /// - [`ServerError::Bind`] if the address is unavailable
    /// - [`ServerError::AlreadyInitialized`] on a second call
    pub async fn init(&mut self) -> Result<(), ServerError> {
        if self.initialized {
            return Err(ServerError::AlreadyInitialized);
        }

        let addr = self.config.addr();
        let mut transport = T::bind(&addr).await.map_err(|e| ServerError::Bind {
            addr: addr.clone(),
            source: Box::new(e),
        })?;
        self.initialized = true;
        self.local_addr = transport.local_addr().ok();
        self.shared.listening.store(true, Ordering::SeqCst);

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = transport.accept() => match accepted {
                        Ok(conn) => {
                            if let Err(e) = shared.connection(conn).await {
                                tracing::error!(error = %e, "failed to register connection");
                            }
                        }
                        Err(e) => {
                            if !shared.is_listening() {
                                break;
                            }
                            tracing::warn!(error = %e, "accept failed");
                        }
                    },
                }
            }
            transport.shutdown().await
        });
        self.acceptor = Some(Acceptor { shutdown, task });

        tracing::info!(addr = %addr, "server listening");
        Ok(())
    }

    /// Registers an accepted connection under the smallest free id.
    ///
    /// The accept loop calls this for every connection; it is public so
    /// connections can also be handed over directly.
    pub async fn connection(&self, conn: T::Connection) -> Result<ClientId, ServerError> {
        self.shared.connection(conn).await
    }

    /// Returns every packet queued since the previous call, in arrival order.
    pub fn drain_inbound(&mut self) -> Vec<Inbound> {
        let mut drained = Vec::new();
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            drained.push(inbound);
        }
        drained
    }

    /// Returns every lifecycle notice queued since the previous call.
    pub fn drain_notices(&mut self) -> Vec<ServerNotice> {
        let mut drained = Vec::new();
        while let Ok(notice) = self.notices_rx.try_recv() {
            drained.push(notice);
        }
        drained
    }

    /// Sends `envelope` to every registered client.
    pub async fn broadcast(&self, envelope: &Envelope) -> Result<(), ServerError> {
        self.send_excluding(envelope, &[]).await
    }

    /// Sends `envelope` to every registered client not in `excluded`.
    pub async fn send_excluding(
        &self,
        envelope: &Envelope,
        excluded: &[ClientId],
    ) -> Result<(), ServerError> {
        let frame = self.shared.codec.encode(envelope)?;
        let targets = self.shared.targets(|id| !excluded.contains(&id)).await;
        deliver(&targets, &frame).await;
        Ok(())
    }

    /// Sends `envelope` to one client. Unknown ids are logged and ignored.
    pub async fn send_to_client(
        &self,
        envelope: &Envelope,
        id: ClientId,
    ) -> Result<(), ServerError> {
        let frame = self.shared.codec.encode(envelope)?;
        let targets = self.shared.targets(|candidate| candidate == id).await;
        if targets.is_empty() {
            tracing::error!(client = %id, "send to unregistered client");
            return Ok(());
        }
        deliver(&targets, &frame).await;
        Ok(())
    }

    /// Deregisters `id` and emits [`ServerNotice::Disconnected`].
    pub async fn on_disconnect(&self, id: ClientId) {
        self.shared.on_disconnect(id).await;
    }

    /// Stops accepting, closes every client, and shuts the transport down.
    ///
    /// Each client gets exactly one close attempt; failures are logged and
    /// never stop the others. Calling `stop` again is a no-op.
    ///
    /// # Errors
    /// [`ServerError::Transport`] if the transport's own shutdown failed.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let was_listening = self.shared.listening.swap(false, Ordering::SeqCst);

        let mut result = Ok(());
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.shutdown.send(());
            match acceptor.task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(ServerError::Transport(Box::new(e))),
                Err(e) => tracing::error!(error = %e, "accept loop panicked"),
            }
        }

        let clients = std::mem::take(&mut *self.shared.clients.write().await);
        for client in clients.values() {
            client.abort_reader();
        }
        let mut closes = Vec::with_capacity(clients.len());
        for client in clients.values() {
            closes.push(tagged_close(client));
        }
        for (id, outcome) in join_all(closes).await {
            if let Err(e) = outcome {
                tracing::warn!(client = %id, error = %e, "failed to close client");
            }
        }

        if was_listening {
            tracing::info!(clients = clients.len(), "server stopped");
        }
        result
    }

    /// Registered ids, ascending.
    pub async fn client_ids(&self) -> Vec<ClientId> {
        self.shared.clients.read().await.keys().copied().collect()
    }

    pub async fn is_registered(&self, id: ClientId) -> bool {
        self.shared.clients.read().await.contains_key(&id)
    }

    pub async fn client_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// The address the transport is bound to. `None` before `init`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.shared.is_listening()
    }
}
