//! Bounded buffer of uncorrelated status messages
//!
//! Poll-based consumers remember the last id they saw and ask for everything
//! newer with [`StatusRingBuffer::messages_since`].

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::protocol::JsonObject;

/// Default number of status messages kept
pub const DEFAULT_STATUS_CAPACITY: usize = 100;

/// A buffered status message with its monotonic id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub id: u64,
    pub value: JsonObject,
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<StatusEntry>,
    last_id: u64,
    capacity: usize,
}

/// Oldest-evicted-first buffer; ids start at 1 and never repeat
#[derive(Debug)]
pub struct StatusRingBuffer {
    ring: Mutex<Ring>,
}

impl StatusRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                last_id: 0,
                capacity,
            }),
        }
    }

    /// Append a message and return the id it was given
    pub fn push(&self, value: JsonObject) -> u64 {
        let mut ring = match self.ring.lock() {
            Ok(ring) => ring,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.last_id += 1;
        let id = ring.last_id;
        if ring.entries.len() >= ring.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(StatusEntry { id, value });
        id
    }

    /// Entries with `id > last_seen_id`, oldest first
    pub fn messages_since(&self, last_seen_id: u64) -> Vec<StatusEntry> {
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|e| e.id > last_seen_id)
                .cloned()
                .collect()
        })
    }

    /// Most recent entry, if any
    pub fn latest(&self) -> Option<StatusEntry> {
        self.with_entries(|entries| entries.back().cloned())
    }

    /// Every buffered entry, oldest first
    pub fn all(&self) -> Vec<StatusEntry> {
        self.with_entries(|entries| entries.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().map(|r| r.capacity).unwrap_or(0)
    }

    fn with_entries<T>(&self, f: impl FnOnce(&VecDeque<StatusEntry>) -> T) -> T {
        match self.ring.lock() {
            Ok(ring) => f(&ring.entries),
            Err(poisoned) => f(&poisoned.into_inner().entries),
        }
    }
}

impl Default for StatusRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_CAPACITY)
    }
}
