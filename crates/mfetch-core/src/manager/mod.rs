//! Source pool and the select/release protocol.
//!
//! The manager owns every [`Source`] plus the global chunk-timing totals
//! behind a single mutex. The lock is held only for the atomic
//! select-and-mark-busy, for release, and for recording outcomes; it is never
//! held across network I/O, so at most one task holds a given source and
//! workers never serialize on transfer latency.

mod select;
mod stats;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::FetchConfig;
use crate::error::{ConfigError, FetchError};
use crate::source::{Source, SourceSnapshot, SourceStatus, UncertaintyBoost};

pub use stats::{ChunkStats, DEFAULT_CHUNK_DURATION, STATS_WINDOW};

/// A source lent to one task between `get_source` and release/error.
///
/// Carries what the task needs for the transfer; the live model stays in the
/// manager. Reports made through a handle whose lease has been superseded by
/// a later `get_source` are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    index: usize,
    lease: u64,
    pub id: String,
    pub host: String,
    /// Bytes/sec; 0 = unlimited.
    pub speed_limit: u64,
}

#[derive(Debug)]
struct Pool {
    sources: Vec<Source>,
    stats: ChunkStats,
}

impl Pool {
    /// The handle's source, if the handle still holds the current lease.
    fn leased(&mut self, handle: &SourceHandle) -> Option<&mut Source> {
        let source = self.sources.get_mut(handle.index)?;
        if source.holds(handle.lease) {
            Some(source)
        } else {
            debug!(source = %handle.id, lease = handle.lease, "stale handle ignored");
            None
        }
    }
}

#[derive(Debug)]
pub struct Manager {
    pool: Mutex<Pool>,
    chunk_size: u64,
    worker_count: usize,
    growth_rate: f64,
    clock: Arc<dyn Clock>,
}

impl Manager {
    pub fn new(cfg: &FetchConfig) -> Result<Self, ConfigError> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: &FetchConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let now = clock.now();
        let sources = cfg.sources.iter().map(|s| Source::new(s, now)).collect();
        Ok(Self {
            pool: Mutex::new(Pool {
                sources,
                stats: ChunkStats::new(),
            }),
            chunk_size: cfg.chunk_size,
            worker_count: cfg.worker_count,
            growth_rate: cfg.uncertainty_growth_rate,
            clock,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn boost_for(&self, stats: &ChunkStats) -> UncertaintyBoost {
        UncertaintyBoost::new(self.growth_rate, stats.average_chunk_duration())
    }

    /// Picks the best eligible source and marks it busy.
    ///
    /// Returns `None` when nothing is eligible right now (all busy, failed,
    /// cooling down, or CDN-gated).
    pub fn get_source(&self) -> Option<SourceHandle> {
        let mut pool = self.lock();
        let now = self.clock.now();
        let boost = self.boost_for(&pool.stats);
        let index = select::pick_best(&pool.sources, &boost, now)?;
        let score = pool.sources[index].score(&boost, now);
        let source = &mut pool.sources[index];
        let lease = match source.acquire() {
            Ok(lease) => lease,
            Err(e) => {
                warn!(source = %source.id(), "selection skipped: {}", e);
                return None;
            }
        };
        debug!(source = %source.id(), score, lease, "source selected");
        Some(SourceHandle {
            index,
            lease,
            id: source.id().to_string(),
            host: source.host().to_string(),
            speed_limit: source.speed_limit(),
        })
    }

    /// Marks the source idle and forgives prior errors. Safe to call twice.
    pub fn release_source(&self, handle: &SourceHandle) {
        let mut pool = self.lock();
        if let Some(source) = pool.leased(handle) {
            source.release();
        }
    }

    /// Feeds one chunk's throughput into the source's EMA and its duration
    /// into the global totals.
    pub fn record_chunk_speed(&self, handle: &SourceHandle, duration: Duration, instant_speed: f64) {
        let mut pool = self.lock();
        let now = self.clock.now();
        let Some(source) = pool.leased(handle) else {
            return;
        };
        source.record_chunk_speed(instant_speed, now);
        debug!(
            source = %source.id(),
            instant_speed,
            speed = source.speed(),
            "chunk speed recorded"
        );
        pool.stats.record(duration);
    }

    pub fn record_downloaded(&self, handle: &SourceHandle, bytes: u64) {
        let mut pool = self.lock();
        if let Some(source) = pool.leased(handle) {
            source.add_downloaded(bytes);
        }
    }

    /// Reports a failed fetch: resets the source's estimate to the global
    /// average speed and escalates its status. Returns the new status; a
    /// stale handle changes nothing and gets the current one.
    pub fn record_error(&self, handle: &SourceHandle, err: &FetchError) -> SourceStatus {
        let mut pool = self.lock();
        let now = self.clock.now();
        let global = self.chunk_size as f64 / pool.stats.average_chunk_duration().as_secs_f64();
        let current = pool
            .sources
            .get(handle.index)
            .map_or(SourceStatus::Failed, Source::status);
        let Some(source) = pool.leased(handle) else {
            return current;
        };
        let status = source.record_error(global, now);
        if status == SourceStatus::Failed {
            warn!(
                source = %source.id(),
                errors = source.consecutive_errors(),
                "source failed permanently: {}",
                err
            );
        } else {
            warn!(
                source = %source.id(),
                errors = source.consecutive_errors(),
                "source error: {}",
                err
            );
        }
        status
    }

    /// True iff every source is `Failed`.
    pub fn all_sources_failed(&self) -> bool {
        self.lock()
            .sources
            .iter()
            .all(|s| s.status() == SourceStatus::Failed)
    }

    pub fn is_cdn_enabled(&self) -> bool {
        select::cdn_enabled(&self.lock().sources)
    }

    /// `growth_rate ^ (elapsed / average_chunk_duration)`.
    pub fn uncertainty_boost(&self, elapsed: Duration) -> f64 {
        let pool = self.lock();
        self.boost_for(&pool.stats).at(elapsed)
    }

    pub fn average_chunk_duration(&self) -> Duration {
        self.lock().stats.average_chunk_duration()
    }

    /// Population speed estimate: one chunk per average chunk duration.
    pub fn global_average_speed(&self) -> f64 {
        self.chunk_size as f64 / self.average_chunk_duration().as_secs_f64()
    }

    pub fn snapshot(&self) -> Vec<SourceSnapshot> {
        let pool = self.lock();
        let now = self.clock.now();
        let boost = self.boost_for(&pool.stats);
        pool.sources.iter().map(|s| s.snapshot(&boost, now)).collect()
    }

    /// Snapshot of one source by id.
    pub fn source(&self, id: &str) -> Option<SourceSnapshot> {
        self.snapshot().into_iter().find(|s| s.id == id)
    }
}
