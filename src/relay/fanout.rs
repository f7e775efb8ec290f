//! Read-then-fan-out primitives
//!
//! One relay round reads a full buffer from the producer and writes it, in
//! registry order, to every client. Writes are sequential, so a client that
//! stops reading delays every client after it; there is no per-client queue.
//! A client whose write fails is closed and compacted out of the registry
//! and the round continues with the next one.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::registry::ClientRegistry;

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Clients that received the whole buffer
    pub delivered: usize,
    /// Clients dropped because their write failed
    pub dropped: usize,
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Fill `buf` completely from `reader`
///
/// Interrupted and would-block errors are retried. End of stream before the
/// buffer is full is [`Error::ShortRead`].
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(Error::ShortRead {
                    expected: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Write all of `data`, retrying only on interruption
pub async fn write_full<W>(writer: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]).await {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Deliver `data` to every client in registry order
///
/// A failure only affects the failing client.
pub async fn broadcast<W>(clients: &mut ClientRegistry<W>, data: &[u8]) -> FanoutReport
where
    W: AsyncWrite + Unpin,
{
    let mut report = FanoutReport::default();
    let mut index = 0;

    while let Some(entry) = clients.get_mut(index) {
        match write_full(&mut entry.writer, data).await {
            Ok(()) => {
                entry.bytes_sent += data.len() as u64;
                report.delivered += 1;
                index += 1;
            }
            Err(e) => {
                let before = clients.len();
                if let Some(dropped) = clients.remove_at(index) {
                    tracing::info!(
                        client = %dropped.id,
                        index = index,
                        clients = before - 1,
                        bytes_sent = dropped.bytes_sent,
                        connected_secs = dropped.connected_for().as_secs(),
                        error = %e,
                        "Client dropped"
                    );
                }
                report.dropped += 1;
            }
        }
    }

    report
}
