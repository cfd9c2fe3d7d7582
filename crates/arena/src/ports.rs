//! Port allocation for session servers.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Tracks which ports of a contiguous range are held by live sessions.
///
/// Not synchronized; the game master keeps it behind a mutex.
#[derive(Debug, Clone)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    busy: BTreeSet<u16>,
}

impl PortPool {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            busy: BTreeSet::new(),
        }
    }

    /// Takes the lowest free port, or `None` when every port is in use.
    pub fn allocate(&mut self) -> Option<u16> {
        let port = self.range.clone().find(|port| !self.busy.contains(port))?;
        self.busy.insert(port);
        Some(port)
    }

    /// Returns `port` to the pool. `false` if it was not allocated.
    pub fn release(&mut self, port: u16) -> bool {
        self.busy.remove(&port)
    }

    pub fn release_all(&mut self) {
        self.busy.clear();
    }

    pub fn is_busy(&self, port: u16) -> bool {
        self.busy.contains(&port)
    }

    /// Number of ports that can still be allocated.
    pub fn available(&self) -> usize {
        self.capacity() - self.busy.len()
    }

    pub fn capacity(&self) -> usize {
        if self.range.is_empty() {
            0
        } else {
            usize::from(*self.range.end() - *self.range.start()) + 1
        }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }
}
