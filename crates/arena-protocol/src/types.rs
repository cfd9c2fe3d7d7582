//! Core protocol types for Arena's wire format.
//!
//! These are the structures that get serialized to bytes, sent over the
//! network, and deserialized on the other side:
//!
//! ```json
//! { "events": [ { "eventCode": 3, "data": { "word": "cat" }, "timestamp": 1700000000000 } ] }
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The compact id a server assigns to a connected client.
///
/// Ids are positive and reused: a server always hands out the smallest id
/// not currently registered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// Opaque identifier of a game session (room).
///
/// Rendered as base64 of random bytes by the game master; the protocol
/// layer treats it as an uninterpreted string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Packet & Envelope
// ---------------------------------------------------------------------------

/// One event on the wire: a numeric event code and an opaque payload.
///
/// The payload is kept as a `serde_json::Value` so the room that owns the
/// event code decides what shape it has (see `Incoming::decode` in
/// `arena-room`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub event_code: u32,

    pub data: serde_json::Value,

    /// Sender wall clock, milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl Packet {
    /// Creates a packet stamped with the current wall clock.
    pub fn new(event_code: u32, data: serde_json::Value) -> Self {
        Self {
            event_code,
            data,
            timestamp: now_millis(),
        }
    }
}

/// The wire unit: an ordered batch of packets.
///
/// A room flushes all entries queued for one client during a tick as a
/// single envelope, so per-tick ordering survives the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub events: Vec<Packet>,
}

impl Envelope {
    pub fn new(events: Vec<Packet>) -> Self {
        Self { events }
    }

    /// An envelope carrying exactly one packet.
    pub fn single(packet: Packet) -> Self {
        Self {
            events: vec![packet],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ClientId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_client_id_display() {
        assert_eq!(ClientId(7).to_string(), "C-7");
    }

    #[test]
    fn test_client_id_orders_numerically() {
        let mut ids = vec![ClientId(3), ClientId(1), ClientId(2)];
        ids.sort();
        assert_eq!(ids, vec![ClientId(1), ClientId(2), ClientId(3)]);
    }

    #[test]
    fn test_session_id_is_transparent_string() {
        let id = SessionId::new("q83vEjRWeJA=");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"q83vEjRWeJA=\"");
        assert_eq!(id.to_string(), "q83vEjRWeJA=");
        assert_eq!(id.as_str(), "q83vEjRWeJA=");
    }

    #[test]
    fn test_packet_uses_camel_case_field_names() {
        let packet = Packet {
            event_code: 5,
            data: json!({ "x": 1 }),
            timestamp: 99,
        };
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["eventCode"], 5);
        assert_eq!(value["data"]["x"], 1);
        assert_eq!(value["timestamp"], 99);
        assert!(value.get("event_code").is_none());
    }

    #[test]
    fn test_packet_timestamp_defaults_to_zero() {
        let packet: Packet =
            serde_json::from_str(r#"{"eventCode":1,"data":"hi"}"#).unwrap();
        assert_eq!(packet.timestamp, 0);
        assert_eq!(packet.data, json!("hi"));
    }

    #[test]
    fn test_packet_requires_event_code_and_data() {
        assert!(serde_json::from_str::<Packet>(r#"{"data":1}"#).is_err());
        assert!(serde_json::from_str::<Packet>(r#"{"eventCode":1}"#).is_err());
    }

    #[test]
    fn test_packet_new_stamps_wall_clock() {
        let before = now_millis();
        let packet = Packet::new(1, json!(null));
        assert!(packet.timestamp >= before);
    }

    #[test]
    fn test_envelope_single() {
        let env = Envelope::single(Packet::new(2, json!([1, 2])));
        assert_eq!(env.len(), 1);
        assert!(!env.is_empty());
        assert!(Envelope::default().is_empty());
    }
}
