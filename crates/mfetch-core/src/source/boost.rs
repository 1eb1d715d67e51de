//! Time-based uncertainty boost.

use std::time::Duration;

/// Bounds on a single boost factor so that scores stay finite and non-zero
/// even after very long idle periods with tiny average chunk durations.
const BOOST_CEILING: f64 = 1e100;
const BOOST_FLOOR: f64 = 1e-100;

/// Parameters of `growth_rate ^ (elapsed / average_chunk_duration)`.
///
/// Used both to inflate stale speed estimates and, with a negative offset, to
/// suppress a bad source's score during its cooldown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UncertaintyBoost {
    pub growth_rate: f64,
    pub avg_chunk_secs: f64,
}

impl UncertaintyBoost {
    pub fn new(growth_rate: f64, avg_chunk_duration: Duration) -> Self {
        Self {
            growth_rate,
            avg_chunk_secs: avg_chunk_duration.as_secs_f64(),
        }
    }

    /// Boost for a signed elapsed time in seconds; below 1.0 when negative.
    pub fn at_secs(&self, elapsed_secs: f64) -> f64 {
        if self.avg_chunk_secs <= 0.0 {
            return 1.0;
        }
        self.growth_rate
            .powf(elapsed_secs / self.avg_chunk_secs)
            .clamp(BOOST_FLOOR, BOOST_CEILING)
    }

    pub fn at(&self, elapsed: Duration) -> f64 {
        self.at_secs(elapsed.as_secs_f64())
    }
}
