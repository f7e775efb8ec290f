//! Client entry types
//!
//! One entry per connected client: the write half the relay loop delivers
//! into, plus bookkeeping used in log lines.

use std::time::{Duration, Instant};

/// Monotonic identifier assigned to each admitted client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connected client
#[derive(Debug)]
pub struct ClientEntry<W> {
    /// Registry-assigned identifier
    pub id: ClientId,

    /// Connection handle the stream is written to
    pub writer: W,

    /// When the client was admitted
    pub connected_at: Instant,

    /// Bytes successfully delivered to this client
    pub bytes_sent: u64,
}

impl<W> ClientEntry<W> {
    pub(super) fn new(id: ClientId, writer: W) -> Self {
        Self {
            id,
            writer,
            connected_at: Instant::now(),
            bytes_sent: 0,
        }
    }

    /// How long the client has been attached
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
