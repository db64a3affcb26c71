//! Serial Message Bus
//!
//! Ties the pieces together: one serial channel, a writer loop draining the
//! command queue, a reader loop feeding the [`Router`], and the scale state
//! the router updates.
//!
//! A single [`ScaleBus`] is created at startup and shared (typically behind
//! an `Arc`) by everything that talks to the device.

mod error;
mod pending;
mod reply;
mod router;
mod status_buffer;

pub use error::BusError;
pub use pending::PendingRequests;
pub use reply::{DeviceReply, STATUS_ERROR, STATUS_SUCCESS};
pub use router::Router;
pub use status_buffer::{StatusEntry, StatusRingBuffer, DEFAULT_STATUS_CAPACITY};

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::config::BusConfig;
use crate::protocol::{
    command_queue, open_port, spawn_loops, DeviceCommand, MessageDecoder, ProtocolError,
    TransportTasks,
};
use crate::scale::{ScaleSnapshot, ScaleState};
use crate::store::{EventFilter, EventStore, WeightEvent};

/// Running bus: background loops plus the shared router
pub struct ScaleBus {
    router: Arc<Router>,
    store: Arc<dyn EventStore>,
    tasks: TransportTasks,
    response_timeout: Duration,
}

impl ScaleBus {
    /// Open the configured serial port and start the loops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &BusConfig, store: Arc<dyn EventStore>) -> Result<Self, ProtocolError> {
        let port = open_port(&config.port_name, config.baud_rate)?;
        info!(
            "scale bus started on {} at {} baud",
            config.port_name, config.baud_rate
        );
        Ok(Self::start(port, config, store))
    }

    /// Start the loops over any byte stream (a serial port, or a pipe in tests)
    pub fn start<T>(io: T, config: &BusConfig, store: Arc<dyn EventStore>) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (queue, drain) = command_queue();
        let scale = Arc::new(ScaleState::new(store.clone(), config.event_threshold));
        let router = Arc::new(Router::new(queue, scale, config.status_buffer_capacity));
        let decoder = MessageDecoder::new(config.reading_field.clone());
        let tasks = spawn_loops(io, drain, decoder, router.clone());

        Self {
            router,
            store,
            tasks,
            response_timeout: config.response_timeout(),
        }
    }

    /// Send a command and wait up to `timeout` for the correlated response
    pub async fn send_and_wait(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<DeviceReply, BusError> {
        self.router.send_and_wait(text, timeout).await
    }

    /// Send a known command with the configured response timeout
    pub async fn send_command(&self, command: DeviceCommand) -> Result<DeviceReply, BusError> {
        self.send_and_wait(&command.text(), self.response_timeout)
            .await
    }

    /// Zero the scale
    pub async fn tare(&self) -> Result<DeviceReply, BusError> {
        self.send_command(DeviceCommand::Tare).await
    }

    /// Calibrate against a known reference weight
    pub async fn calibrate(&self, reference_weight: f64) -> Result<DeviceReply, BusError> {
        self.send_command(DeviceCommand::Calibrate(reference_weight))
            .await
    }

    /// Latest weight reported by the device
    pub fn current_weight(&self) -> f64 {
        self.router.scale().current_weight()
    }

    pub fn scale_snapshot(&self) -> ScaleSnapshot {
        self.router.scale().snapshot()
    }

    pub fn latest_message(&self) -> Option<StatusEntry> {
        self.router.latest_message()
    }

    pub fn messages_since(&self, last_seen_id: u64) -> Vec<StatusEntry> {
        self.router.messages_since(last_seen_id)
    }

    pub fn all_messages(&self) -> Vec<StatusEntry> {
        self.router.all_messages()
    }

    /// Recorded weight events, most recent first
    pub fn events(&self, filter: &EventFilter) -> Result<Vec<WeightEvent>, BusError> {
        Ok(self.store.query(filter)?)
    }

    /// Shared router, for callers that need it outside the bus's lifetime
    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Whether either background loop has stopped
    pub fn is_finished(&self) -> bool {
        self.tasks.writer.is_finished() || self.tasks.reader.is_finished()
    }
}

impl Drop for ScaleBus {
    fn drop(&mut self) {
        self.tasks.abort();
    }
}
