use std::collections::BTreeMap;
use std::time::Duration;

use arena::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Event {
    Chat,
    Guess,
    Welcome,
    Joined,
    Left,
    Miss,
    Solved,
    Reveal,
}

#[derive(Deserialize)]
struct ChatIn {
    text: String,
}

#[derive(Deserialize)]
struct GuessIn {
    word: String,
}

#[derive(Serialize)]
struct ChatOut<'a> {
    from: ClientId,
    text: &'a str,
}

#[derive(Serialize)]
struct Welcome<'a> {
    you: ClientId,
    players: &'a [ClientId],
    round: u64,
}

#[derive(Serialize)]
struct Solved<'a> {
    by: ClientId,
    word: &'a str,
    score: u32,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct CrocodileConfig {
    words: Vec<String>,
    /// Firings per round before the word is revealed.
    round_ticks: u64,
}

impl Default for CrocodileConfig {
    fn default() -> Self {
        Self {
            words: ["otter", "lantern", "volcano", "bicycle", "harbor"]
                .map(String::from)
                .to_vec(),
            round_ticks: 33 * 60,
        }
    }
}

struct Crocodile {
    words: Vec<String>,
    round_ticks: u64,
    round: u64,
    round_started: u64,
    scores: BTreeMap<ClientId, u32>,
}

impl Crocodile {
    fn secret(&self) -> &str {
        if self.words.is_empty() {
            return "";
        }
        &self.words[(self.round as usize) % self.words.len()]
    }

    fn next_round(&mut self, tick: u64) {
        self.round += 1;
        self.round_started = tick;
    }

    fn chat(&mut self, ctx: &mut RoomContext<Event>, msg: Incoming) -> Result<(), RoomError> {
        let chat: ChatIn = msg.decode()?;
        let out = ChatOut {
            from: msg.client,
            text: &chat.text,
        };
        ctx.send_to_all(Event::Chat, out, &[msg.client])
    }

    fn guess(&mut self, ctx: &mut RoomContext<Event>, msg: Incoming) -> Result<(), RoomError> {
        let guess: GuessIn = msg.decode()?;
        if !guess.word.trim().eq_ignore_ascii_case(self.secret()) {
            return ctx.send(Event::Miss, &guess.word, msg.client);
        }

        let score = {
            let score = self.scores.entry(msg.client).or_default();
            *score += 1;
            *score
        };
        let solved = Solved {
            by: msg.client,
            word: self.secret(),
            score,
        };
        ctx.send_to_all(Event::Solved, solved, &[])?;
        tracing::info!(session_id = %ctx.session_id(), client_id = %msg.client, round = self.round, "word guessed");
        self.next_round(ctx.tick());
        Ok(())
    }
}

impl GameRoom for Crocodile {
    type Config = CrocodileConfig;
    type Event = Event;

    fn new(config: &CrocodileConfig, _session_id: &SessionId) -> Self {
        Self {
            words: config.words.clone(),
            round_ticks: config.round_ticks,
            round: 0,
            round_started: 0,
            scores: BTreeMap::new(),
        }
    }

    fn event_map() -> Result<EventMap<Event>, RoomError> {
        EventMap::new([
            (1, Event::Chat),
            (2, Event::Guess),
            (10, Event::Welcome),
            (11, Event::Joined),
            (12, Event::Left),
            (13, Event::Miss),
            (14, Event::Solved),
            (15, Event::Reveal),
        ])
    }

    fn handlers() -> Handlers<Self> {
        Handlers::new()
            .on(Event::Chat, Crocodile::chat)
            .on(Event::Guess, Crocodile::guess)
    }

    async fn first_tick(&mut self, ctx: &mut RoomContext<Event>) -> Result<(), RoomError> {
        if self.words.is_empty() {
            return Err(RoomError::Game("no words configured".into()));
        }
        tracing::info!(session_id = %ctx.session_id(), words = self.words.len(), "crocodile ready");
        Ok(())
    }

    async fn tick(&mut self, ctx: &mut RoomContext<Event>, info: &TickInfo) -> Result<(), RoomError> {
        if self.round_ticks == 0 || info.tick - self.round_started < self.round_ticks {
            return Ok(());
        }
        ctx.send_to_all(Event::Reveal, self.secret(), &[])?;
        self.next_round(info.tick);
        Ok(())
    }

    fn on_connect(&mut self, ctx: &mut RoomContext<Event>, client: ClientId) {
        let players = ctx.clients().to_vec();
        let welcome = Welcome {
            you: client,
            players: &players,
            round: self.round,
        };
        let sent = ctx
            .send(Event::Welcome, welcome, client)
            .and_then(|()| ctx.send_to_all(Event::Joined, client, &[client]));
        if let Err(e) = sent {
            tracing::warn!(client_id = %client, error = %e, "failed to announce join");
        }
    }

    fn on_disconnect(&mut self, ctx: &mut RoomContext<Event>, client: ClientId) {
        self.scores.remove(&client);
        if let Err(e) = ctx.send_to_all(Event::Left, client, &[]) {
            tracing::warn!(client_id = %client, error = %e, "failed to announce leave");
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    arena::init_tracing();

    let master = GameMasterBuilder::new().build::<Crocodile, _>(
        CrocodileConfig::default(),
        |config: ServerConfig| Server::<WebSocketTransport, _>::new(config, JsonCodec),
    );

    let session_id = master.create_session().await?;
    let port = master.port_of(&session_id).await;
    tracing::info!(session_id = %session_id, port = ?port, "crocodile session open");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    master.shutdown(Duration::from_secs(10)).await?;
    Ok(())
}
