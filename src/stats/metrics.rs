//! Statistics for a broadcaster run

use std::time::{Duration, Instant};

use crate::relay::FanoutReport;

/// Counters accumulated by the control loop
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// When the server started
    pub started_at: Instant,
    /// Completed relay rounds
    pub rounds: u64,
    /// Bytes read from producers
    pub bytes_read: u64,
    /// Bytes written to clients, summed over clients
    pub bytes_delivered: u64,
    /// Clients added to the registry
    pub clients_admitted: u64,
    /// Connections closed because the registry was full
    pub clients_rejected: u64,
    /// Clients dropped after a failed write
    pub clients_dropped: u64,
    /// Producer restarts performed
    pub restarts: u64,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStats {
    /// Create zeroed stats starting now
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            rounds: 0,
            bytes_read: 0,
            bytes_delivered: 0,
            clients_admitted: 0,
            clients_rejected: 0,
            clients_dropped: 0,
            restarts: 0,
        }
    }

    /// Account for one read-then-fan-out round of `len` bytes
    pub fn record_round(&mut self, len: usize, report: FanoutReport) {
        self.rounds += 1;
        self.bytes_read += len as u64;
        self.bytes_delivered += (len * report.delivered) as u64;
        self.clients_dropped += report.dropped as u64;
    }

    /// Time since start
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Producer throughput in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime().as_secs();
        if secs > 0 {
            (self.bytes_read * 8) / secs
        } else {
            0
        }
    }
}
