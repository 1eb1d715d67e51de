//! Progress snapshots sent to the CLI while a fetch runs.

/// Progress of one fetch, sent after every completed chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes counted from completed chunks.
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Seconds since the fetch started.
    pub elapsed_secs: f64,
    pub chunks_done: usize,
    pub chunk_count: usize,
}

impl ProgressStats {
    /// Average rate since start (0 before any time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Seconds remaining at the current rate; `None` while the rate is unknown.
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
