//! Serial Protocol Communication
//!
//! Implements the newline-delimited JSON protocol spoken by the scale
//! controller: wire codec, outgoing command queue, serial port access and
//! the background reader/writer loops.

pub mod codec;
pub mod commands;
mod error;
mod queue;
pub mod serial;
pub mod transport;

pub use codec::{
    decode, encode, Command, CorrelationId, DecodedMessage, JsonObject, MessageDecoder,
    ParseFailure,
};
pub use commands::DeviceCommand;
pub use error::ProtocolError;
pub use queue::{command_queue, CommandDrain, CommandQueue, Dequeued};
pub use serial::{list_ports, open_port, PortInfo};
pub use transport::{spawn_loops, MessageSink, TransportTasks};

/// Default baud rate for the scale controller
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default time a caller waits for a correlated response, in seconds
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 20;

/// Field carrying the command text in host → device lines
pub const MESSAGE_FIELD: &str = "message";

/// Field carrying the correlation id in both directions
pub const CORRELATION_FIELD: &str = "message_uuid";

/// Canonical field carrying the weight in unsolicited readings
pub const DEFAULT_READING_FIELD: &str = "average";
