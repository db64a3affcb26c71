//! Outgoing command queue
//!
//! Unbounded FIFO between request callers and the writer loop. Producers are
//! cheap to clone; there is exactly one consumer.

use std::time::Duration;
use tokio::sync::mpsc;

use super::{Command, ProtocolError};

/// Create a connected producer/consumer pair
pub fn command_queue() -> (CommandQueue, CommandDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandQueue { tx }, CommandDrain { rx })
}

/// Producer side, shared by every caller
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandQueue {
    /// Append a command without blocking.
    ///
    /// Fails only when the consumer (writer loop) is gone.
    pub fn enqueue(&self, command: Command) -> Result<(), ProtocolError> {
        self.tx
            .send(command)
            .map_err(|_| ProtocolError::QueueClosed)
    }

    /// Whether the consumer has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of a single [`CommandDrain::dequeue`] call
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    /// Next command in enqueue order
    Command(Command),
    /// Nothing arrived within the timeout
    Empty,
    /// Every producer has been dropped and the queue is drained
    Closed,
}

/// Consumer side, owned by the writer loop
#[derive(Debug)]
pub struct CommandDrain {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandDrain {
    /// Wait up to `timeout` for the next command
    pub async fn dequeue(&mut self, timeout: Duration) -> Dequeued {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(command)) => Dequeued::Command(command),
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::Empty,
        }
    }
}
