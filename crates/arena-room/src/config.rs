//! Room configuration and state machine.

use arena_tick::{TickConfig, TickPolicy};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for a room instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Tick rate in Hz. 0 means the room never fires.
    pub tick_rate: u32,

    /// What the scheduler does when a firing overruns its period.
    pub tick_policy: TickPolicy,

    /// Random delay (microseconds) added before the first firing so rooms
    /// created together do not tick in lockstep.
    pub initial_jitter_us: u64,
}

impl RoomConfig {
    /// Scheduler settings derived from this room config.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            tick_rate_hz: self.tick_rate,
            policy: self.tick_policy,
            initial_jitter_us: self.initial_jitter_us,
            ..TickConfig::default()
        }
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: 33,
            tick_policy: TickPolicy::default(),
            initial_jitter_us: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// Transitions are strictly ordered:
///
/// ```text
/// Created → Initialized → Starting → Playing → Closed
/// ```
///
/// - **Created**: built, server not yet bound.
/// - **Initialized**: server listening, actor spawned.
/// - **Starting**: running the one-off `first_tick`.
/// - **Playing**: the scheduler fires the per-tick loop.
/// - **Closed**: stopped, server shut down, all clients closed.
///
/// Any state may jump straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Created,
    Initialized,
    Starting,
    Playing,
    Closed,
}

impl RoomState {
    /// Returns `true` while the room is firing ticks.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomState::*;
        matches!(
            (self, target),
            (Created, Initialized)
                | (Initialized, Starting)
                | (Starting, Playing)
                | (Created | Initialized | Starting | Playing, Closed)
        )
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Starting => write!(f, "Starting"),
            Self::Playing => write!(f, "Playing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
