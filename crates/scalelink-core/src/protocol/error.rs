//! Protocol errors

use thiserror::Error;

/// Errors that can occur on the serial link
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Command queue closed")]
    QueueClosed,

    #[error("Invalid UTF-8 on serial line ({0} bytes)")]
    InvalidUtf8(usize),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(err.description),
            _ => ProtocolError::SerialError(err.description),
        }
    }
}
