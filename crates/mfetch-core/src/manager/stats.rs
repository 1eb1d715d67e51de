//! Global chunk-timing totals with a decaying window.

use std::time::Duration;

/// Sample count at which the running totals are rescaled.
pub const STATS_WINDOW: f64 = 10.0;

/// Average chunk duration assumed before any chunk has completed.
pub const DEFAULT_CHUNK_DURATION: Duration = Duration::from_secs(1);

/// Running count/time of completed chunks across all sources.
///
/// Once more than [`STATS_WINDOW`] samples are held, both totals are scaled
/// back to the window so old samples decay instead of diluting new ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStats {
    chunks: f64,
    total_secs: f64,
}

impl ChunkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration: Duration) {
        self.chunks += 1.0;
        self.total_secs += duration.as_secs_f64();
        if self.chunks > STATS_WINDOW {
            self.total_secs *= STATS_WINDOW / self.chunks;
            self.chunks = STATS_WINDOW;
        }
    }

    /// Equivalent sample count (at most the window).
    pub fn samples(&self) -> f64 {
        self.chunks
    }

    /// Never zero: falls back to [`DEFAULT_CHUNK_DURATION`] without usable samples.
    pub fn average_chunk_duration(&self) -> Duration {
        if self.chunks <= 0.0 || self.total_secs <= 0.0 {
            return DEFAULT_CHUNK_DURATION;
        }
        Duration::from_secs_f64(self.total_secs / self.chunks)
    }
}
