//! Weight Event Store
//!
//! Durable record of weight changes detected by the scale state. The bus only
//! needs [`EventStore::append`]; [`EventStore::query`] serves the outer layer.

mod memory;
mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier assigned to a stored event
pub type EventId = Uuid;

/// A recorded change in weight. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub starting_weight: f64,
    pub final_weight: f64,
}

impl WeightEvent {
    /// Create an event stamped with the current time
    pub fn new(starting_weight: f64, final_weight: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            starting_weight,
            final_weight,
        }
    }

    /// Signed change in weight
    pub fn delta(&self) -> f64 {
        self.final_weight - self.starting_weight
    }
}

/// Optional bounds for [`EventStore::query`].
///
/// Weight bounds apply to `final_weight`; all bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Whether `event` falls inside every set bound
    pub fn matches(&self, event: &WeightEvent) -> bool {
        self.min_weight.map_or(true, |min| event.final_weight >= min)
            && self.max_weight.map_or(true, |max| event.final_weight <= max)
            && self.start.map_or(true, |start| event.timestamp >= start)
            && self.end.map_or(true, |end| event.timestamp <= end)
    }
}

/// Errors from an event store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt event row: {0}")]
    CorruptRow(String),

    #[error("Event store lock poisoned")]
    Poisoned,
}

/// Append/query interface over durable event storage
pub trait EventStore: Send + Sync {
    /// Persist a new event, timestamped now
    fn append(&self, starting_weight: f64, final_weight: f64) -> Result<EventId, StoreError>;

    /// Events matching `filter`, most recent first
    fn query(&self, filter: &EventFilter) -> Result<Vec<WeightEvent>, StoreError>;

    /// Every stored event, most recent first
    fn all(&self) -> Result<Vec<WeightEvent>, StoreError> {
        self.query(&EventFilter::default())
    }
}
