//! Game master configuration.

use std::ops::RangeInclusive;

use arena_room::RoomConfig;
use serde::{Deserialize, Serialize};

/// Settings shared by every session a [`GameMaster`](crate::GameMaster)
/// creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Interface every session's server binds to.
    pub host: String,

    /// Ports handed out to sessions, one each, lowest free first.
    pub port_range: RangeInclusive<u16>,

    /// Room settings applied to every session.
    pub room: RoomConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port_range: 25565..=27632,
            room: RoomConfig::default(),
        }
    }
}
