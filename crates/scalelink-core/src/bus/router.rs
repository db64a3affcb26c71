//! Message router / correlator
//!
//! Every decoded line from the reader loop lands here and goes to exactly one
//! of: a waiting caller, the scale state, or the status buffer.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::pending::PendingRequests;
use super::status_buffer::{StatusEntry, StatusRingBuffer};
use super::{BusError, DeviceReply};
use crate::protocol::{
    Command, CommandQueue, CorrelationId, DecodedMessage, MessageSink, ParseFailure,
    CORRELATION_FIELD,
};
use crate::scale::ScaleState;

/// Shared state behind a [`ScaleBus`](super::ScaleBus)
pub struct Router {
    queue: CommandQueue,
    pending: PendingRequests,
    statuses: StatusRingBuffer,
    scale: Arc<ScaleState>,
}

/// Removes a still-registered waiter when `send_and_wait` is dropped mid-flight
struct WaiterGuard<'a> {
    pending: &'a PendingRequests,
    id: CorrelationId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(&self.id);
    }
}

impl Router {
    pub fn new(queue: CommandQueue, scale: Arc<ScaleState>, status_capacity: usize) -> Self {
        Self {
            queue,
            pending: PendingRequests::new(),
            statuses: StatusRingBuffer::new(status_capacity),
            scale,
        }
    }

    /// Send `text` to the device and wait for its correlated response.
    ///
    /// On timeout the request is withdrawn; a response that lands after that
    /// is treated as unmatched.
    pub async fn send_and_wait(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<DeviceReply, BusError> {
        let command = Command::new(text);
        let id = command.correlation_id.clone();

        let mut rx = self.pending.register(id.clone())?;
        let _guard = WaiterGuard {
            pending: &self.pending,
            id: id.clone(),
        };
        self.queue.enqueue(command)?;

        let payload = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(result) => result.map_err(|_| BusError::ChannelClosed)?,
            Err(_) => {
                if self.pending.cancel(&id) {
                    info!("No response to '{}' ({}), timed out after {:?}", text, id, timeout);
                    return Err(BusError::Timeout {
                        command: text.to_string(),
                        timeout,
                    });
                }
                // The response claimed the waiter before it could be withdrawn
                rx.try_recv().map_err(|_| BusError::ChannelClosed)?
            }
        };

        let reply = DeviceReply::from(payload);
        info!(
            "'{}' answered: {}",
            text,
            reply.status().unwrap_or("no status returned")
        );
        Ok(reply)
    }

    /// Number of requests still waiting on a response
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn scale(&self) -> &ScaleState {
        &self.scale
    }

    pub fn messages_since(&self, last_seen_id: u64) -> Vec<StatusEntry> {
        self.statuses.messages_since(last_seen_id)
    }

    pub fn latest_message(&self) -> Option<StatusEntry> {
        self.statuses.latest()
    }

    pub fn all_messages(&self) -> Vec<StatusEntry> {
        self.statuses.all()
    }
}

impl MessageSink for Router {
    fn dispatch(&self, message: Result<DecodedMessage, ParseFailure>) {
        match message {
            Err(ParseFailure { text }) => {
                info!(target: "scalelink::device", "{}", text);
            }
            Ok(DecodedMessage::Response {
                correlation_id,
                payload,
            }) => {
                if let Err(mut payload) = self.pending.resolve(&correlation_id, payload) {
                    debug!("unmatched response {}, buffering as status", correlation_id);
                    payload.insert(
                        CORRELATION_FIELD.to_string(),
                        correlation_id.to_string().into(),
                    );
                    self.statuses.push(payload);
                }
            }
            Ok(DecodedMessage::Reading { value }) => {
                if let Err(e) = self.scale.handle_reading(value) {
                    warn!("failed to record weight event for reading {}: {}", value, e);
                }
            }
            Ok(DecodedMessage::Status { payload }) => {
                let id = self.statuses.push(payload);
                debug!("status message #{}", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{command_queue, CommandDrain, Dequeued, MessageDecoder};
    use crate::store::MemoryEventStore;
    use serde_json::json;

    fn router() -> (Arc<Router>, CommandDrain, Arc<MemoryEventStore>) {
        let (queue, drain) = command_queue();
        let store = Arc::new(MemoryEventStore::new());
        let scale = Arc::new(ScaleState::new(store.clone(), 5.0));
        (Arc::new(Router::new(queue, scale, 100)), drain, store)
    }

    fn feed(router: &Router, line: &str) {
        router.dispatch(MessageDecoder::default().decode(line));
    }

    async fn next_command(drain: &mut CommandDrain) -> Command {
        match drain.dequeue(Duration::from_secs(5)).await {
            Dequeued::Command(c) => c,
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_trip_strips_id() {
        let (router, mut drain, _) = router();

        let waiter = {
            let router = router.clone();
            tokio::spawn(async move { router.send_and_wait("TARE", Duration::from_secs(5)).await })
        };

        let command = next_command(&mut drain).await;
        assert_eq!(command.text, "TARE");
        feed(
            &router,
            &format!(
                r#"{{"message_uuid":"{}","status":"success"}}"#,
                command.correlation_id
            ),
        );

        let reply = waiter.await.unwrap().unwrap();
        assert!(reply.is_success());
        assert!(reply.get(CORRELATION_FIELD).is_none());
        assert_eq!(router.pending_requests(), 0);
        assert!(router.all_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_buffered() {
        let (router, mut drain, _) = router();

        let result = router.send_and_wait("TARE", Duration::from_secs(20)).await;
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(router.pending_requests(), 0);

        let command = next_command(&mut drain).await;
        feed(
            &router,
            &format!(
                r#"{{"message_uuid":"{}","status":"success"}}"#,
                command.correlation_id
            ),
        );

        let latest = router.latest_message().unwrap();
        assert_eq!(
            latest.value.get(CORRELATION_FIELD),
            Some(&json!(command.correlation_id.to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_caller_withdraws_waiter() {
        let (router, mut drain, _) = router();

        let task = {
            let router = router.clone();
            tokio::spawn(async move { router.send_and_wait("TARE", Duration::from_secs(60)).await })
        };
        next_command(&mut drain).await;
        assert_eq!(router.pending_requests(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(router.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_send_fails_when_writer_gone() {
        let (router, drain, _) = router();
        drop(drain);

        let err = router
            .send_and_wait("TARE", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Protocol(_)));
        assert_eq!(router.pending_requests(), 0);
    }

    #[test]
    fn test_readings_drive_scale_state() {
        let (router, _drain, store) = router();
        for line in [
            r#"{"average": 10}"#,
            r#"{"average": 10}"#,
            r#"{"average": 16}"#,
            r#"{"average": 16}"#,
            r#"{"average": 9}"#,
        ] {
            feed(&router, line);
        }

        assert_eq!(router.scale().current_weight(), 9.0);
        assert_eq!(store.len(), 2);
        assert!(router.all_messages().is_empty());
    }

    #[test]
    fn test_status_and_free_text() {
        let (router, _drain, store) = router();
        feed(&router, "Calibration is required for sensors!");
        feed(&router, r#"{"status":"ready"}"#);

        let all = router.all_messages();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 1);
        assert_eq!(all[0].value.get("status"), Some(&json!("ready")));
        assert_eq!(router.scale().current_weight(), 0.0);
        assert!(store.is_empty());
    }
}
