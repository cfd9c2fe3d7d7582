//! In-process transport doubles for tests (feature `testing`).
//!
//! [`pair`] returns a [`MockConnection`] to hand to a server and the
//! [`MockPeer`] that plays the remote client: it injects inbound frames,
//! observes outbound frames and close attempts, and can make sends or
//! closes fail. [`MockTransport`] and [`connect`] form a tiny in-process
//! network for tests that only see a server from the outside, and
//! [`fail_shutdown`] breaks one listener's shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock, Mutex as StdMutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, Transport};

static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Probe {
    closes: AtomicUsize,
    fail_close: AtomicBool,
    fail_send: AtomicBool,
}

/// Server-side half of an in-memory connection.
pub struct MockConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    probe: Arc<Probe>,
}

/// Client-side half: drives and inspects a [`MockConnection`].
pub struct MockPeer {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    probe: Arc<Probe>,
}

/// Creates a connected mock pair.
pub fn pair() -> (MockConnection, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let probe = Arc::new(Probe::default());
    let conn = MockConnection {
        id: ConnectionId::new(NEXT_MOCK_ID.fetch_add(1, Ordering::Relaxed)),
        inbound: Mutex::new(in_rx),
        outbound: out_tx,
        probe: Arc::clone(&probe),
    };
    let peer = MockPeer {
        tx: Some(in_tx),
        rx: out_rx,
        probe,
    };
    (conn, peer)
}

impl MockPeer {
    /// Delivers one inbound frame to the server side.
    pub fn send(&self, data: impl Into<Vec<u8>>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(data.into());
        }
    }

    /// Closes the client side: the server's `recv` returns `Ok(None)`.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Waits for the next frame the server sent.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Returns a frame the server already sent, without waiting.
    pub fn try_frame(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// How many times the server side attempted `close`.
    pub fn close_count(&self) -> usize {
        self.probe.closes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `close` on the server side fail.
    pub fn fail_close(&self, fail: bool) {
        self.probe.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `send` on the server side fail.
    pub fn fail_send(&self, fail: bool) {
        self.probe.fail_send.store(fail, Ordering::SeqCst);
    }
}

impl Connection for MockConnection {
    type Error = std::io::Error;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.probe.fail_send.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock send failure",
            ));
        }
        self.outbound.send(data.to_vec()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "peer dropped")
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_close.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("mock close failure"));
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

struct Listener {
    tx: mpsc::UnboundedSender<MockConnection>,
    fail_shutdown: Arc<AtomicBool>,
}

/// Listeners bound by [`MockTransport`], keyed by address.
type Network = HashMap<SocketAddr, Listener>;

static NETWORK: LazyLock<StdMutex<Network>> = LazyLock::new(Default::default);

fn network() -> MutexGuard<'static, Network> {
    NETWORK.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_addr(addr: &str) -> std::io::Result<SocketAddr> {
    addr.parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

fn not_bound() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nothing bound")
}

/// Makes the `shutdown` of the listener bound at `addr` fail.
///
/// The listener still unregisters, so the address can be bound again.
pub fn fail_shutdown(addr: &str) -> std::io::Result<()> {
    let addr = parse_addr(addr)?;
    let network = network();
    let listener = network.get(&addr).ok_or_else(not_bound)?;
    listener.fail_shutdown.store(true, Ordering::SeqCst);
    Ok(())
}

/// Dials a [`MockTransport`] bound at `addr`.
///
/// The server side is delivered through the listener's `accept`; the
/// returned peer drives the client side.
pub fn connect(addr: &str) -> std::io::Result<MockPeer> {
    let addr = parse_addr(addr)?;
    let listener = network()
        .get(&addr)
        .map(|listener| listener.tx.clone())
        .ok_or_else(not_bound)?;
    let (conn, peer) = pair();
    listener.send(conn).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "listener gone")
    })?;
    Ok(peer)
}

/// An in-process listener.
///
/// Binding an address that another live `MockTransport` holds fails with
/// `AddrInUse`, like a real socket. Connections arrive through [`connect`].
pub struct MockTransport {
    addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<MockConnection>,
    registered: mpsc::UnboundedSender<MockConnection>,
    fail_shutdown: Arc<AtomicBool>,
}

impl MockTransport {
    fn unregister(&self) {
        let mut network = network();
        if network
            .get(&self.addr)
            .is_some_and(|listener| listener.tx.same_channel(&self.registered))
        {
            network.remove(&self.addr);
        }
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;
    type Error = std::io::Error;

    async fn bind(addr: &str) -> Result<Self, Self::Error> {
        let addr = parse_addr(addr)?;
        let mut network = network();
        if network.contains_key(&addr) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("{addr} already bound"),
            ));
        }
        let (tx, incoming) = mpsc::unbounded_channel();
        let fail_shutdown = Arc::new(AtomicBool::new(false));
        network.insert(
            addr,
            Listener {
                tx: tx.clone(),
                fail_shutdown: Arc::clone(&fail_shutdown),
            },
        );
        Ok(Self {
            addr,
            incoming,
            registered: tx,
            fail_shutdown,
        })
    }

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.incoming.recv().await.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "listener closed")
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.unregister();
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("mock shutdown failure"));
        }
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        Ok(self.addr)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.unregister();
    }
}
