//! Serial transport loops
//!
//! The writer loop drains the command queue onto the wire; the reader loop
//! turns inbound lines into decoded messages for a [`MessageSink`]. Both are
//! generic over the byte stream so tests can drive them with an in-memory
//! duplex pipe instead of a serial port.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{encode, DecodedMessage, MessageDecoder, ParseFailure};
use super::queue::{CommandDrain, Dequeued};
use super::ProtocolError;

/// How long the writer waits on an empty queue before re-checking it
pub const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Receiver of everything the reader loop decodes
pub trait MessageSink: Send + Sync + 'static {
    /// Handle one non-empty line, already decoded
    fn dispatch(&self, message: Result<DecodedMessage, ParseFailure>);
}

/// Handles to the two background loops
#[derive(Debug)]
pub struct TransportTasks {
    pub writer: JoinHandle<()>,
    pub reader: JoinHandle<()>,
}

impl TransportTasks {
    /// Stop both loops
    pub fn abort(&self) {
        self.writer.abort();
        self.reader.abort();
    }
}

/// Split `io` and spawn the writer and reader loops on the current runtime
pub fn spawn_loops<T, S>(
    io: T,
    drain: CommandDrain,
    decoder: MessageDecoder,
    sink: Arc<S>,
) -> TransportTasks
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    S: MessageSink,
{
    let (read_half, write_half) = tokio::io::split(io);
    TransportTasks {
        writer: tokio::spawn(run_writer(write_half, drain)),
        reader: tokio::spawn(run_reader(read_half, decoder, sink)),
    }
}

/// Write queued commands in FIFO order until every producer is gone.
///
/// A failed write is logged and the command is dropped (at-most-once).
pub async fn run_writer<W>(mut writer: W, mut drain: CommandDrain)
where
    W: AsyncWrite + Unpin,
{
    loop {
        match drain.dequeue(DEQUEUE_POLL_INTERVAL).await {
            Dequeued::Command(command) => {
                let bytes = encode(&command);
                match write_line(&mut writer, &bytes).await {
                    Ok(()) => debug!(
                        "sent '{}' ({})",
                        command.text, command.correlation_id
                    ),
                    Err(e) => warn!(
                        "Write error for '{}' ({}): {}",
                        command.text, command.correlation_id, e
                    ),
                }
            }
            Dequeued::Empty => continue,
            Dequeued::Closed => {
                debug!("command queue closed, writer loop exiting");
                break;
            }
        }
    }
}

async fn write_line<W>(writer: &mut W, bytes: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read newline-terminated lines and hand them to `sink` until end of stream.
///
/// Read failures and undecodable bytes are logged and the loop keeps going.
pub async fn run_reader<R, S>(reader: R, decoder: MessageDecoder, sink: Arc<S>)
where
    R: AsyncRead + Unpin,
    S: MessageSink + ?Sized,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!("serial stream closed, reader loop exiting");
                break;
            }
            Ok(n) => {
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim(),
                    Err(_) => {
                        warn!("Read error: {}", ProtocolError::InvalidUtf8(n));
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                sink.dispatch(decoder.decode(line));
            }
            Err(e) => {
                warn!("Read error: {}", e);
                tokio::task::yield_now().await;
            }
        }
    }
}
