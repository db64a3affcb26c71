//! Structured replies handed back to callers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BusError;
use crate::protocol::JsonObject;

/// Status value the firmware uses for a successful command
pub const STATUS_SUCCESS: &str = "success";

/// Status value used for replies synthesised from a [`BusError`]
pub const STATUS_ERROR: &str = "error";

/// A device response with the correlation id already stripped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceReply {
    fields: JsonObject,
}

impl DeviceReply {
    /// The `status` field, if the device sent a string one
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(STATUS_SUCCESS)
    }

    /// Look up any other payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &JsonObject {
        &self.fields
    }

    pub fn into_fields(self) -> JsonObject {
        self.fields
    }

    /// `{"status": "error", "message": ...}` for callers that want a uniform shape
    pub fn from_error(error: &BusError) -> Self {
        let mut fields = JsonObject::new();
        fields.insert("status".into(), Value::from(STATUS_ERROR));
        fields.insert("message".into(), Value::from(error.to_string()));
        if error.is_timeout() {
            fields.insert("timeout".into(), Value::Bool(true));
        }
        Self { fields }
    }
}

impl From<JsonObject> for DeviceReply {
    fn from(fields: JsonObject) -> Self {
        Self { fields }
    }
}
