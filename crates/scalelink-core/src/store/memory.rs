//! In-memory event store

use std::sync::Mutex;

use super::{EventFilter, EventId, EventStore, StoreError, WeightEvent};

/// Volatile store used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<WeightEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events in insertion order
    pub fn in_order(&self) -> Vec<WeightEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, starting_weight: f64, final_weight: f64) -> Result<EventId, StoreError> {
        let event = WeightEvent::new(starting_weight, final_weight);
        let id = event.id;
        self.events
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(event);
        Ok(id)
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<WeightEvent>, StoreError> {
        let events = self.events.lock().map_err(|_| StoreError::Poisoned)?;
        // Insertion order is chronological; reversing keeps ties stable
        Ok(events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}
