//! Device commands
//!
//! Known command texts understood by the scale controller firmware.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-initiated operations on the scale controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeviceCommand {
    /// Zero the scale at its current load (`TARE`)
    Tare,

    /// Calibrate against a known reference weight (`CALIBRATE:<weight>`)
    Calibrate(f64),
}

impl DeviceCommand {
    /// Command text as sent in the `message` field
    pub fn text(&self) -> String {
        match self {
            DeviceCommand::Tare => "TARE".to_string(),
            DeviceCommand::Calibrate(reference) => format!("CALIBRATE:{}", reference),
        }
    }

    /// Parse a command text back into a known command
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "TARE" {
            return Some(DeviceCommand::Tare);
        }
        let reference = text.strip_prefix("CALIBRATE:")?;
        reference
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(DeviceCommand::Calibrate)
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
