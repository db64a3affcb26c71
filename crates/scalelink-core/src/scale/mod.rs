//! Scale State
//!
//! Tracks the latest weight reported by the controller and turns large enough
//! moves into persisted [`WeightEvent`](crate::store::WeightEvent)s.

mod detector;
mod state;

pub use detector::{detect, Detection};
pub use state::{ScaleSnapshot, ScaleState};

/// Default minimum absolute change (in reading units) that records an event
pub const DEFAULT_EVENT_THRESHOLD: f64 = 5.0;
