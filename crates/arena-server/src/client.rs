//! A connected client: its compact id, its transport handle, and the task
//! that reads from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arena_protocol::{ClientId, Codec};
use arena_transport::{Connection, ConnectionId};
use tokio::task::JoinHandle;

use crate::server::Shared;

/// The transport handle plus a latch so `close` reaches the transport at
/// most once, whoever calls it first (the reader or `Server::stop`).
struct Link<K> {
    conn: K,
    closed: AtomicBool,
}

impl<K: Connection> Link<K> {
    async fn close(&self) -> Result<(), K::Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.conn.close().await
    }
}

/// One registered connection.
///
/// Created by the server when a connection is accepted. On creation a reader
/// task is spawned that forwards every frame to the server and, when the
/// stream ends or fails, deregisters the client and closes the handle.
///
/// The reader only holds a weak reference to the server, so a dropped server
/// does not stay alive because of its clients.
pub struct Client<K: Connection> {
    id: ClientId,
    link: Arc<Link<K>>,
    reader: JoinHandle<()>,
}

impl<K: Connection> Client<K> {
    pub(crate) fn spawn<C: Codec>(
        id: ClientId,
        conn: K,
        server: Weak<Shared<K, C>>,
    ) -> Arc<Self> {
        let link = Arc::new(Link {
            conn,
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_loop(id, Arc::clone(&link), server));
        Arc::new(Self { id, link, reader })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The transport-level id of the underlying connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.link.conn.id()
    }

    /// Sends one already-encoded frame.
    pub async fn send(&self, frame: &[u8]) -> Result<(), K::Error> {
        self.link.conn.send(frame).await
    }

    /// Closes the transport handle. Later calls are no-ops.
    pub async fn close(&self) -> Result<(), K::Error> {
        self.link.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn abort_reader(&self) {
        self.reader.abort();
    }
}

async fn read_loop<K: Connection, C: Codec>(
    id: ClientId,
    link: Arc<Link<K>>,
    server: Weak<Shared<K, C>>,
) {
    loop {
        match link.conn.recv().await {
            Ok(Some(frame)) => {
                let Some(server) = server.upgrade() else {
                    break;
                };
                server.on_client_data(id, &frame);
            }
            Ok(None) => {
                tracing::debug!(client = %id, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::error!(client = %id, error = %e, "connection error");
                break;
            }
        }
    }

    if let Some(server) = server.upgrade() {
        server.on_disconnect(id).await;
    }

    if let Err(e) = link.close().await {
        tracing::debug!(client = %id, error = %e, "close after disconnect failed");
    }
}
