//! Process-wide scale state

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::detector::{detect, Detection};
use crate::store::{EventId, EventStore, StoreError};

/// Point-in-time copy of the scale state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScaleSnapshot {
    /// Latest reading, last write wins
    pub current_weight: f64,
    /// Weight the next reading is compared against; unset until the first reading
    pub baseline: Option<f64>,
}

/// Current weight plus delta baseline, with the event store it reports to.
///
/// Only the reader loop mutates this, so readings are applied in arrival order.
pub struct ScaleState {
    snapshot: Mutex<ScaleSnapshot>,
    threshold: f64,
    store: Arc<dyn EventStore>,
}

impl ScaleState {
    pub fn new(store: Arc<dyn EventStore>, threshold: f64) -> Self {
        Self {
            snapshot: Mutex::new(ScaleSnapshot::default()),
            threshold,
            store,
        }
    }

    /// Apply one reading.
    ///
    /// Returns the id of the event recorded for it, if any. When the store
    /// rejects the event the baseline is left where it was, so the next
    /// reading is compared against the same anchor.
    pub fn handle_reading(&self, value: f64) -> Result<Option<EventId>, StoreError> {
        let detection = {
            let mut snapshot = self.snapshot.lock().map_err(|_| StoreError::Poisoned)?;
            snapshot.current_weight = value;
            let detection = detect(snapshot.baseline, value, self.threshold);
            if detection == Detection::Establish {
                snapshot.baseline = Some(value);
            }
            detection
        };

        let Detection::Changed { from, to } = detection else {
            return Ok(None);
        };

        let id = self.store.append(from, to)?;
        info!("weight changed {} -> {} (event {})", from, to, id);

        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.baseline = Some(to);
        }
        debug!("baseline re-anchored at {}", to);
        Ok(Some(id))
    }

    /// Latest observed weight (0.0 before any reading)
    pub fn current_weight(&self) -> f64 {
        self.snapshot().current_weight
    }

    /// Current delta baseline
    pub fn baseline(&self) -> Option<f64> {
        self.snapshot().baseline
    }

    pub fn snapshot(&self) -> ScaleSnapshot {
        self.snapshot
            .lock()
            .map(|s| *s)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// Minimum change that records an event
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
