//! Game master behaviour: port allocation, session lifecycle, shutdown, and
//! one real WebSocket session end to end.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arena::prelude::*;
use arena::server::ServerError;
use arena_transport::testing::MockTransport;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test game
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Event {
    Ping,
    Pong,
}

#[derive(Clone, Default)]
struct LobbyConfig {
    close_at: Option<u64>,
    stall: Option<Duration>,
}

struct Lobby {
    config: LobbyConfig,
}

impl Lobby {
    fn ping(&mut self, ctx: &mut RoomContext<Event>, msg: Incoming) -> Result<(), RoomError> {
        ctx.send(Event::Pong, &msg.data, msg.client)
    }
}

impl GameRoom for Lobby {
    type Config = LobbyConfig;
    type Event = Event;

    fn new(config: &LobbyConfig, _session_id: &SessionId) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn event_map() -> Result<EventMap<Event>, RoomError> {
        EventMap::new([(1, Event::Ping), (2, Event::Pong)])
    }

    fn handlers() -> Handlers<Self> {
        Handlers::new().on(Event::Ping, Lobby::ping)
    }

    async fn tick(&mut self, ctx: &mut RoomContext<Event>, info: &TickInfo) -> Result<(), RoomError> {
        if let Some(stall) = self.config.stall {
            tokio::time::sleep(stall).await;
        }
        if self.config.close_at == Some(info.tick) {
            ctx.close();
        }
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn mock_server(config: ServerConfig) -> Server<MockTransport, JsonCodec> {
    Server::new(config, JsonCodec)
}

fn ws_server(config: ServerConfig) -> Server<WebSocketTransport, JsonCodec> {
    Server::new(config, JsonCodec)
}

type MockMaster = GameMaster<Lobby, fn(ServerConfig) -> Server<MockTransport, JsonCodec>>;

/// Mock listeners share one address space per test binary, so every test
/// gets its own slice of ports.
fn master(ports: std::ops::RangeInclusive<u16>, game: LobbyConfig) -> MockMaster {
    GameMasterBuilder::new()
        .host("127.0.0.1")
        .port_range(ports)
        .tick_rate(10)
        .build::<Lobby, _>(game, mock_server as fn(ServerConfig) -> _)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_sessions_get_distinct_ports_until_exhausted() {
    let master = master(43_000..=43_002, LobbyConfig::default());

    let mut ports = HashSet::new();
    for _ in 0..3 {
        let id = master.create_session().await.unwrap();
        ports.insert(master.port_of(&id).await.unwrap());
    }
    assert_eq!(ports, HashSet::from([43_000, 43_001, 43_002]));

    let err = master.create_session().await.unwrap_err();
    assert!(matches!(err, MasterError::NoAvailablePorts { .. }));
    assert_eq!(master.session_count().await, 3);

    master.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_session_frees_its_port() {
    let master = master(43_010..=43_010, LobbyConfig::default());

    let first = master.create_session().await.unwrap();
    assert!(master.create_session().await.is_err());

    master.stop_session(&first).await.unwrap();
    assert_eq!(master.available_ports().await, 1);

    let second = master.create_session().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(master.port_of(&second).await, Some(43_010));

    let err = master.stop_session(&first).await.unwrap_err();
    assert!(matches!(err, MasterError::SessionNotFound(id) if id == first));

    master.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_never_share_a_port() {
    let master = Arc::new(master(43_020..=43_029, LobbyConfig::default()));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let master = Arc::clone(&master);
        tasks.push(tokio::spawn(async move { master.create_session().await }));
    }

    let mut ports = HashSet::new();
    for task in tasks {
        let id = task.await.unwrap().unwrap();
        assert!(ports.insert(master.port_of(&id).await.unwrap()));
    }
    assert_eq!(ports.len(), 10);
    assert_eq!(master.available_ports().await, 0);

    master.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_every_port_and_session() {
    let master = master(43_030..=43_033, LobbyConfig::default());
    for _ in 0..4 {
        master.create_session().await.unwrap();
    }

    master.stop().await.unwrap();

    assert_eq!(master.session_count().await, 0);
    assert_eq!(master.available_ports().await, 4);
    // Ports are really free again: new sessions bind them.
    master.create_session().await.unwrap();
    master.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_port_held_outside_the_pool_is_skipped() {
    let blocker = MockTransport::bind("127.0.0.1:43040").await.unwrap();
    let master = master(43_040..=43_041, LobbyConfig::default());

    let first = master.create_session().await.unwrap();
    assert_eq!(master.port_of(&first).await, Some(43_041));
    assert_eq!(master.available_ports().await, 1);

    // Only the squatted port is left: its bind error is surfaced.
    let err = master.create_session().await.unwrap_err();
    assert!(matches!(
        err,
        MasterError::Room(RoomError::Server(ServerError::Bind { .. }))
    ));
    assert_eq!(master.available_ports().await, 1);
    assert_eq!(master.session_count().await, 1);

    drop(blocker);
    let second = master.create_session().await.unwrap();
    assert_eq!(master.port_of(&second).await, Some(43_040));
    master.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_session_created_during_stop_keeps_its_port() {
    let master = Arc::new(master(
        43_080..=43_081,
        LobbyConfig {
            stall: Some(Duration::from_secs(1)),
            ..LobbyConfig::default()
        },
    ));
    let stale = master.create_session().await.unwrap();
    assert_eq!(master.port_of(&stale).await, Some(43_080));
    // The first firing is now stalled, so stopping this room takes a while.
    sleep_ms(110).await;

    let stopping = {
        let master = Arc::clone(&master);
        tokio::spawn(async move { master.stop().await })
    };
    sleep_ms(1).await;

    let fresh = master.create_session().await.unwrap();
    assert_eq!(master.port_of(&fresh).await, Some(43_081));

    stopping.await.unwrap().unwrap();
    assert_eq!(master.session_ids().await, vec![fresh.clone()]);
    assert_eq!(master.port_of(&fresh).await, Some(43_081));
    assert_eq!(master.available_ports().await, 1);

    let reused = master.create_session().await.unwrap();
    assert_eq!(master.port_of(&reused).await, Some(43_080));
    let err = master.create_session().await.unwrap_err();
    assert!(matches!(err, MasterError::NoAvailablePorts { .. }));

    master.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_stop_is_reported_and_does_not_spare_the_others() {
    let master = master(43_090..=43_092, LobbyConfig::default());

    let mut peers = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = master.create_session().await.unwrap();
        let port = master.port_of(&id).await.unwrap();
        peers.push(arena_transport::testing::connect(&format!("127.0.0.1:{port}")).unwrap());
        ids.push(id);
    }
    arena_transport::testing::fail_shutdown("127.0.0.1:43091").unwrap();
    sleep_ms(1).await;

    let err = master.stop().await.unwrap_err();
    match err {
        MasterError::Shutdown { failed } => assert_eq!(failed, vec![ids[1].clone()]),
        other => panic!("expected a shutdown error, got {other}"),
    }

    // Every room was stopped: each one closed its client.
    for peer in &peers {
        assert_eq!(peer.close_count(), 1);
    }
    assert_eq!(master.session_count().await, 0);
    assert_eq!(master.available_ports().await, 3);
}

#[tokio::test]
async fn test_websocket_bind_failure_is_surfaced() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let master = GameMasterBuilder::new()
        .host("127.0.0.1")
        .port_range(port..=port)
        .build::<Lobby, _>(LobbyConfig::default(), ws_server);

    let err = master.create_session().await.unwrap_err();
    assert!(matches!(
        err,
        MasterError::Room(RoomError::Server(ServerError::Bind { .. }))
    ));
    assert_eq!(master.available_ports().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reap_closed_removes_self_closed_rooms() {
    let master = master(
        43_050..=43_051,
        LobbyConfig {
            close_at: Some(1),
            ..LobbyConfig::default()
        },
    );
    let id = master.create_session().await.unwrap();
    assert!(master.reap_closed().await.is_empty());

    sleep_ms(150).await;
    assert_eq!(master.session_state(&id).await, Some(RoomState::Closed));

    assert_eq!(master.reap_closed().await, vec![id.clone()]);
    assert_eq!(master.session_state(&id).await, None);
    assert_eq!(master.available_ports().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_bounded_by_its_timeout() {
    let master = master(
        43_060..=43_060,
        LobbyConfig {
            stall: Some(Duration::from_secs(60)),
            ..LobbyConfig::default()
        },
    );
    master.create_session().await.unwrap();
    sleep_ms(110).await;

    let err = master.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, MasterError::ShutdownTimeout(d) if d == Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_within_timeout_succeeds() {
    let master = master(43_070..=43_071, LobbyConfig::default());
    master.create_session().await.unwrap();
    master.create_session().await.unwrap();

    master.shutdown(Duration::from_secs(10)).await.unwrap();
    assert_eq!(master.session_count().await, 0);
}

// =========================================================================
// End to end over WebSocket
// =========================================================================

#[tokio::test]
async fn test_websocket_session_round_trip() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let master = GameMasterBuilder::new()
        .host("127.0.0.1")
        .port_range(port..=port)
        .build::<Lobby, _>(LobbyConfig::default(), ws_server);
    let id = master.create_session().await.unwrap();
    assert_eq!(master.port_of(&id).await, Some(port));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .unwrap();

    let ping = Envelope::single(Packet::new(1, json!({ "n": 7 })));
    ws.send(Message::Binary(JsonCodec.encode(&ping).unwrap().into()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let envelope = JsonCodec.decode(&reply.into_data()).unwrap();
    assert_eq!(envelope.len(), 1);
    assert_eq!(envelope.events[0].event_code, 2);
    assert_eq!(envelope.events[0].data, json!({ "n": 7 }));

    master.shutdown(Duration::from_secs(10)).await.unwrap();
}
