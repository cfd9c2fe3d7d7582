//! End-to-end room behaviour: per-tick dispatch and flush ordering, error
//! isolation, lifecycle, and tick cadence under an overrunning step.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_protocol::{ClientId, Codec, Envelope, JsonCodec, SessionId};
use arena_room::{
    EventMap, GameRoom, Handlers, Incoming, Room, RoomConfig, RoomContext, RoomError, RoomHandle,
    RoomState,
};
use arena_server::{Server, ServerConfig, ServerError};
use arena_tick::TickInfo;
use arena_transport::testing::{self, MockPeer, MockTransport};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// A probe game that records what the room asks of it
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Event {
    Echo,
    Shout,
    Ignored,
    Note,
}

const NOTE: u32 = 10;

#[derive(Clone, Default)]
struct ProbeConfig {
    log: Arc<Mutex<Vec<String>>>,
    fail_first_tick: bool,
    slow_tick: Option<(u64, Duration)>,
    close_at: Option<u64>,
}

struct Probe {
    config: ProbeConfig,
}

impl Probe {
    fn record(&self, entry: String) {
        self.config.log.lock().unwrap().push(entry);
    }

    fn echo(&mut self, ctx: &mut RoomContext<Event>, msg: Incoming) -> Result<(), RoomError> {
        self.record(format!("echo {}", msg.data));
        ctx.send(Event::Note, &msg.data, msg.client)
    }

    fn shout(&mut self, ctx: &mut RoomContext<Event>, msg: Incoming) -> Result<(), RoomError> {
        ctx.send_to_all(Event::Note, &msg.data, &[msg.client])
    }
}

impl GameRoom for Probe {
    type Config = ProbeConfig;
    type Event = Event;

    fn new(config: &ProbeConfig, _session_id: &SessionId) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn event_map() -> Result<EventMap<Event>, RoomError> {
        EventMap::new([
            (1, Event::Echo),
            (2, Event::Shout),
            (3, Event::Ignored),
            (NOTE, Event::Note),
        ])
    }

    fn handlers() -> Handlers<Self> {
        Handlers::new()
            .on(Event::Echo, Probe::echo)
            .on(Event::Shout, Probe::shout)
    }

    async fn first_tick(&mut self, _ctx: &mut RoomContext<Event>) -> Result<(), RoomError> {
        self.record("first".to_string());
        if self.config.fail_first_tick {
            return Err(RoomError::Game("boom".to_string()));
        }
        Ok(())
    }

    async fn tick(
        &mut self,
        ctx: &mut RoomContext<Event>,
        info: &TickInfo,
    ) -> Result<(), RoomError> {
        self.record(format!(
            "tick {} late {} skipped {}",
            info.tick,
            info.late_by.as_millis(),
            info.ticks_skipped
        ));
        ctx.send_to_all(Event::Note, json!({ "tick": info.tick }), &[])?;
        if let Some((tick, step)) = self.config.slow_tick {
            if tick == info.tick {
                tokio::time::sleep(step).await;
            }
        }
        if self.config.close_at == Some(info.tick) {
            ctx.close();
        }
        Ok(())
    }

    fn on_connect(&mut self, _ctx: &mut RoomContext<Event>, client: ClientId) {
        self.record(format!("connect {client}"));
    }

    fn on_disconnect(&mut self, _ctx: &mut RoomContext<Event>, client: ClientId) {
        self.record(format!("disconnect {client}"));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static NEXT_PORT: AtomicU16 = AtomicU16::new(42_000);

fn next_addr() -> ServerConfig {
    ServerConfig::new("127.0.0.1", NEXT_PORT.fetch_add(1, Ordering::Relaxed))
}

fn ten_hz() -> RoomConfig {
    RoomConfig {
        tick_rate: 10,
        ..RoomConfig::default()
    }
}

fn build(
    server_config: ServerConfig,
    config: &ProbeConfig,
) -> Room<Probe, MockTransport, JsonCodec> {
    let session_id = SessionId::new("test-session");
    let game = Probe::new(config, &session_id);
    let server = Server::new(server_config, JsonCodec);
    Room::new(server, session_id, ten_hz(), Probe::event_map().unwrap(), game)
}

async fn start(config: &ProbeConfig) -> (RoomHandle, String) {
    let server_config = next_addr();
    let addr = server_config.addr();
    let handle = build(server_config, config).start().await.unwrap();
    (handle, addr)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn send(peer: &MockPeer, events: Value) {
    peer.send(serde_json::to_vec(&json!({ "events": events })).unwrap());
}

fn decode(frame: Vec<u8>) -> Envelope {
    JsonCodec.decode(&frame).unwrap()
}

fn log(config: &ProbeConfig) -> Vec<String> {
    config.log.lock().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_outbound_is_flushed_after_the_step_in_enqueue_order() {
    let config = ProbeConfig::default();
    let (handle, addr) = start(&config).await;
    let mut peer = testing::connect(&addr).unwrap();

    send(
        &peer,
        json!([
            { "eventCode": 1, "data": "a" },
            { "eventCode": 1, "data": "b" },
        ]),
    );
    sleep_ms(50).await;
    assert!(peer.try_frame().is_none(), "nothing goes out between firings");

    sleep_ms(60).await;
    let envelope = decode(peer.try_frame().unwrap());
    let data: Vec<Value> = envelope.events.iter().map(|p| p.data.clone()).collect();
    assert_eq!(data, vec![json!("a"), json!("b"), json!({ "tick": 1 })]);
    assert!(envelope.events.iter().all(|p| p.event_code == NOTE));
    assert!(peer.try_frame().is_none(), "one envelope per client per firing");

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unmapped_and_unhandled_codes_do_not_block_later_packets() {
    let config = ProbeConfig::default();
    let (handle, addr) = start(&config).await;
    let mut peer = testing::connect(&addr).unwrap();

    send(
        &peer,
        json!([
            { "eventCode": 99, "data": "lost" },
            { "eventCode": 3, "data": "ignored" },
            { "eventCode": 1, "data": "after" },
        ]),
    );
    sleep_ms(110).await;

    let envelope = decode(peer.try_frame().unwrap());
    assert_eq!(envelope.events[0].data, json!("after"));
    assert_eq!(envelope.len(), 2);
    assert_eq!(
        log(&config).iter().filter(|e| e.starts_with("echo")).count(),
        1
    );

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_send_to_all_excludes_the_sender() {
    let config = ProbeConfig::default();
    let (handle, addr) = start(&config).await;
    let mut alice = testing::connect(&addr).unwrap();
    let mut bob = testing::connect(&addr).unwrap();

    send(&alice, json!([{ "eventCode": 2, "data": "hello" }]));
    sleep_ms(110).await;

    let to_bob = decode(bob.try_frame().unwrap());
    assert_eq!(to_bob.events[0].data, json!("hello"));
    let to_alice = decode(alice.try_frame().unwrap());
    assert_eq!(to_alice.len(), 1, "alice only gets the tick note");

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_hooks_run_in_the_next_firing() {
    let config = ProbeConfig::default();
    let (handle, addr) = start(&config).await;

    let mut peer = testing::connect(&addr).unwrap();
    sleep_ms(110).await;
    peer.hang_up();
    sleep_ms(100).await;

    assert_eq!(
        log(&config),
        vec![
            "first".to_string(),
            "connect C-1".to_string(),
            "tick 1 late 0 skipped 0".to_string(),
            "disconnect C-1".to_string(),
            "tick 2 late 0 skipped 0".to_string(),
        ]
    );

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_error_is_not_fatal() {
    let config = ProbeConfig {
        fail_first_tick: true,
        ..ProbeConfig::default()
    };
    let (mut handle, _addr) = start(&config).await;

    assert_eq!(handle.wait_for(RoomState::Playing).await, RoomState::Playing);
    sleep_ms(110).await;
    assert!(log(&config).contains(&"tick 1 late 0 skipped 0".to_string()));

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_clients_and_releases_the_address() {
    let config = ProbeConfig::default();
    let (handle, addr) = start(&config).await;
    let peer = testing::connect(&addr).unwrap();
    sleep_ms(110).await;

    handle.stop().await.unwrap();

    assert_eq!(peer.close_count(), 1);
    assert!(testing::connect(&addr).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_game_can_close_its_own_room() {
    let config = ProbeConfig {
        close_at: Some(2),
        ..ProbeConfig::default()
    };
    let (mut handle, _addr) = start(&config).await;

    assert_eq!(handle.wait_for(RoomState::Closed).await, RoomState::Closed);
    assert!(handle.is_closed());
    assert_eq!(
        log(&config).iter().filter(|e| e.starts_with("tick")).count(),
        2
    );

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_the_address_is_taken() {
    let config = ProbeConfig::default();
    let server_config = next_addr();
    let first = build(server_config.clone(), &config).start().await.unwrap();

    let second = build(server_config, &config);
    assert_eq!(second.state(), RoomState::Created);
    let err = second.start().await.unwrap_err();
    assert!(matches!(err, RoomError::Server(ServerError::Bind { .. })));

    first.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_step_delays_later_firings_without_skipping() {
    let config = ProbeConfig {
        slow_tick: Some((1, Duration::from_millis(250))),
        ..ProbeConfig::default()
    };
    let (handle, _addr) = start(&config).await;

    sleep_ms(420).await;

    let ticks: Vec<String> = log(&config)
        .into_iter()
        .filter(|e| e.starts_with("tick"))
        .collect();
    assert_eq!(
        ticks,
        vec![
            "tick 1 late 0 skipped 0",
            "tick 2 late 150 skipped 0",
            "tick 3 late 50 skipped 0",
            "tick 4 late 0 skipped 0",
        ]
    );

    handle.stop().await.unwrap();
}
