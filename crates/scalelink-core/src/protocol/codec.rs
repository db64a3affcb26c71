//! Wire codec
//!
//! Encodes outbound commands as single JSON lines and classifies inbound
//! lines into typed messages.
//!
//! Host → device:
//! ```text
//! {"message":"TARE","message_uuid":"6f1c...-..."}\n
//! ```
//!
//! Device → host, one JSON object per line:
//! - `{"message_uuid": "...", "status": "success", ...}`: response to a command
//! - `{"average": 12.5, ...}`: unsolicited reading
//! - anything else that parses as a JSON object: status broadcast
//!
//! Lines that are not JSON objects are free-text device output.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use uuid::Uuid;

use super::{CORRELATION_FIELD, DEFAULT_READING_FIELD, MESSAGE_FIELD};

/// A JSON object as received from the device
pub type JsonObject = Map<String, Value>;

/// Opaque token matching a response to the command that caused it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An outbound command, consumed exactly once by the writer loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command text, e.g. `TARE`
    pub text: String,
    /// Id echoed back by the device in its response
    pub correlation_id: CorrelationId,
}

impl Command {
    /// Create a command with a freshly generated correlation id
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            correlation_id: CorrelationId::generate(),
        }
    }
}

/// Encode a command as one newline-terminated JSON line
pub fn encode(command: &Command) -> Vec<u8> {
    let mut line = json!({
        MESSAGE_FIELD: command.text,
        CORRELATION_FIELD: command.correlation_id.as_str(),
    })
    .to_string();
    line.push('\n');
    line.into_bytes()
}

/// A classified inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    /// Reply to a host command; `payload` no longer carries the correlation id
    Response {
        correlation_id: CorrelationId,
        payload: JsonObject,
    },
    /// Unsolicited weight reading
    Reading { value: f64 },
    /// Uncorrelated informational object
    Status { payload: JsonObject },
}

/// A line that is not a JSON object; keeps the raw line for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub text: String,
}

/// Classifies inbound lines using a configured reading field
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    reading_field: String,
}

impl MessageDecoder {
    /// Create a decoder that treats `reading_field` as the weight key
    pub fn new(reading_field: impl Into<String>) -> Self {
        Self {
            reading_field: reading_field.into(),
        }
    }

    /// The key readings are recognised by
    pub fn reading_field(&self) -> &str {
        &self.reading_field
    }

    /// Decode and classify a single line
    pub fn decode(&self, line: &str) -> Result<DecodedMessage, ParseFailure> {
        let mut object = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => object,
            _ => {
                return Err(ParseFailure {
                    text: line.to_string(),
                })
            }
        };

        if let Some(id) = object.remove(CORRELATION_FIELD) {
            let correlation_id = match id {
                Value::String(s) => CorrelationId(s),
                other => CorrelationId(other.to_string()),
            };
            return Ok(DecodedMessage::Response {
                correlation_id,
                payload: object,
            });
        }

        if let Some(value) = object.get(&self.reading_field).and_then(reading_value) {
            return Ok(DecodedMessage::Reading { value });
        }

        Ok(DecodedMessage::Status { payload: object })
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_READING_FIELD)
    }
}

/// Decode a line using the default reading field
pub fn decode(line: &str) -> Result<DecodedMessage, ParseFailure> {
    MessageDecoder::default().decode(line)
}

/// Accept JSON numbers and numeric strings (firmware prints fixed-point strings)
fn reading_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
