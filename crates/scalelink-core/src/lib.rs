//! # scalelink Core Library
//!
//! Serial message bus between a host and a JSON-speaking scale controller.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Newline-delimited JSON wire codec and command queue
//! - Background serial reader/writer loops
//! - Command/response correlation with timeouts
//! - Scale state tracking and weight-change event detection
//! - SQLite-backed weight event storage
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scalelink_core::{config::BusConfig, store::SqliteEventStore, bus::ScaleBus};
//!
//! let config = BusConfig::from_env()?;
//! let store = Arc::new(SqliteEventStore::open(&config.database_path)?);
//! let bus = ScaleBus::open(&config, store)?;
//!
//! let reply = bus.tare().await?;
//! println!("tare: {:?}, weight now {}", reply.status(), bus.current_weight());
//! ```

pub mod bus;
pub mod config;
pub mod protocol;
pub mod scale;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bus::{BusError, DeviceReply, ScaleBus, StatusEntry};
    pub use crate::config::{BusConfig, ConfigError};
    pub use crate::protocol::{DeviceCommand, ProtocolError};
    pub use crate::scale::{ScaleSnapshot, ScaleState};
    pub use crate::store::{
        EventFilter, EventStore, MemoryEventStore, SqliteEventStore, StoreError, WeightEvent,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
