//! The table between wire event codes and a room's event names.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::RoomError;

/// Bidirectional map between numeric event codes and a room's events.
///
/// Built once per room type and shared by every instance; inbound packets
/// are routed by code, outbound sends are addressed by event.
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Event { Chat, Guess }
///
/// let map = EventMap::new([(1, Event::Chat), (2, Event::Guess)])?;
/// assert_eq!(map.event(2), Some(Event::Guess));
/// assert_eq!(map.code(Event::Chat), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct EventMap<E> {
    by_code: HashMap<u32, E>,
    by_event: HashMap<E, u32>,
}

impl<E: Copy + Eq + Hash + Debug> EventMap<E> {
    /// Builds a map from `(code, event)` pairs.
    ///
    /// # Errors
    /// [`RoomError::InvalidEventMap`] if a code or an event appears twice.
    pub fn new(pairs: impl IntoIterator<Item = (u32, E)>) -> Result<Self, RoomError> {
        let mut by_code = HashMap::new();
        let mut by_event = HashMap::new();
        for (code, event) in pairs {
            if by_code.insert(code, event).is_some() {
                return Err(RoomError::InvalidEventMap(format!(
                    "code {code} is mapped twice"
                )));
            }
            if by_event.insert(event, code).is_some() {
                return Err(RoomError::InvalidEventMap(format!(
                    "event {event:?} is mapped twice"
                )));
            }
        }
        Ok(Self { by_code, by_event })
    }

    /// A map with no events; every inbound code is unmapped.
    pub fn empty() -> Self {
        Self {
            by_code: HashMap::new(),
            by_event: HashMap::new(),
        }
    }

    pub fn event(&self, code: u32) -> Option<E> {
        self.by_code.get(&code).copied()
    }

    pub fn code(&self, event: E) -> Option<u32> {
        self.by_event.get(&event).copied()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
