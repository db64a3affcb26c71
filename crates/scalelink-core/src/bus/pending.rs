//! Outstanding requests awaiting a correlated response

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::BusError;
use crate::protocol::{CorrelationId, JsonObject};

/// Map of correlation id → waiter.
///
/// Resolution and cancellation both remove the entry under the same lock, so
/// exactly one of them wins for any id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<CorrelationId, oneshot::Sender<JsonObject>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`
    pub fn register(&self, id: CorrelationId) -> Result<oneshot::Receiver<JsonObject>, BusError> {
        let mut waiters = self.waiters.lock().map_err(|_| BusError::ChannelClosed)?;
        if waiters.contains_key(&id) {
            return Err(BusError::DuplicateCorrelation(id));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(id, tx);
        Ok(rx)
    }

    /// Deliver `payload` to the waiter for `id`.
    ///
    /// Hands the payload back when no live waiter exists (never issued,
    /// already resolved, timed out, or the caller went away).
    pub fn resolve(&self, id: &CorrelationId, payload: JsonObject) -> Result<(), JsonObject> {
        let Ok(mut waiters) = self.waiters.lock() else {
            return Err(payload);
        };
        match waiters.remove(id) {
            // Sent while still holding the lock; see `cancel`
            Some(tx) => tx.send(payload),
            None => Err(payload),
        }
    }

    /// Withdraw the waiter for `id`.
    ///
    /// Returns false if a response already claimed it, in which case the
    /// payload is sitting in the waiter's receiver.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.waiters
            .lock()
            .map(|mut waiters| waiters.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Number of outstanding requests
    pub fn len(&self) -> usize {
        self.waiters.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
