//! Read pacing for speed-limited sources.

use std::thread;
use std::time::{Duration, Instant};

/// Periodic ticker with absolute deadlines.
///
/// The k-th `wait` returns no earlier than `start + k * interval`, so a body
/// read one buffer per tick can never exceed `buffer_size / interval` on
/// average, even when a late tick lets the next one fire immediately.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    /// Ticker sized so `buffer_size / interval ~= speed_limit`; `None` when
    /// unlimited.
    pub fn for_limit(buffer_size: usize, speed_limit: u64) -> Option<Self> {
        if speed_limit == 0 {
            return None;
        }
        let interval = Duration::from_secs_f64(buffer_size as f64 / speed_limit as f64);
        Some(Self::new(interval))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }
        self.next += self.interval;
    }
}
