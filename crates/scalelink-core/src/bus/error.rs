//! Caller-visible bus errors

use std::time::Duration;
use thiserror::Error;

use crate::protocol::{CorrelationId, ProtocolError};
use crate::store::StoreError;

/// Errors returned to callers of the bus
#[derive(Error, Debug)]
pub enum BusError {
    #[error("No response to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Correlation id {0} is already pending")]
    DuplicateCorrelation(CorrelationId),

    #[error("Response channel closed before a reply arrived")]
    ChannelClosed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Event store error: {0}")]
    Store(#[from] StoreError),
}

impl BusError {
    /// Whether the device simply did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout { .. })
    }
}
