//! Per-source speed and health model.
//!
//! A `Source` tracks one remote endpoint:
//! - a smoothed speed estimate (EMA with weight 0.5 on the previous value)
//! - the raw speed of the last chunk and when it was measured
//! - a consecutive-error counter driving `Idle/Bad -> Failed`
//!
//! Sources are owned by the [`Manager`](crate::manager::Manager); all
//! mutation goes through its select/release/record operations.

mod boost;
mod snapshot;
mod status;

use std::time::Instant;

use crate::config::SourceConfig;

pub use boost::UncertaintyBoost;
pub use snapshot::SourceSnapshot;
pub use status::{SourceStatus, TransitionError, MAX_CONSECUTIVE_ERRORS};

/// Weight of the previous estimate in the speed EMA.
pub const SPEED_DECAY: f64 = 0.5;

/// Cooldown after an error, in average chunk durations.
pub const COOLDOWN_CHUNKS: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct Source {
    id: String,
    host: String,
    boost: f64,
    speed_limit: u64,
    slow_threshold: f64,
    is_cdn: bool,

    status: SourceStatus,
    speed: f64,
    last_speed: f64,
    updated_at: Instant,
    last_error_at: Option<Instant>,
    downloaded: u64,
    attempts: u64,
    consecutive_errors: u32,
}

impl Source {
    pub(crate) fn new(cfg: &SourceConfig, now: Instant) -> Self {
        Self {
            id: cfg.id.clone(),
            host: cfg.host.clone(),
            boost: cfg.boost,
            speed_limit: cfg.speed_limit,
            slow_threshold: cfg.slow_threshold,
            is_cdn: cfg.is_cdn,
            status: SourceStatus::Idle,
            speed: cfg.initial_speed.max(0.0),
            last_speed: 0.0,
            updated_at: now,
            last_error_at: None,
            downloaded: 0,
            attempts: 0,
            consecutive_errors: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_cdn(&self) -> bool {
        self.is_cdn
    }

    pub fn speed_limit(&self) -> u64 {
        self.speed_limit
    }

    pub fn status(&self) -> SourceStatus {
        self.status
    }

    /// Smoothed speed estimate in bytes/sec.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn last_speed(&self) -> f64 {
        self.last_speed
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Direct sources below their threshold count as slow for CDN gating.
    pub fn is_slow(&self) -> bool {
        self.speed < self.slow_threshold
    }

    /// Folds one chunk measurement into the speed EMA.
    pub(crate) fn record_chunk_speed(&mut self, instant_speed: f64, now: Instant) {
        let instant_speed = instant_speed.max(0.0);
        self.speed = (1.0 - SPEED_DECAY) * instant_speed + SPEED_DECAY * self.speed;
        self.last_speed = instant_speed;
        self.updated_at = now;
    }

    pub(crate) fn add_downloaded(&mut self, bytes: u64) {
        self.downloaded = self.downloaded.saturating_add(bytes);
    }

    /// Distrusts local history after a failure: the estimate falls back to the
    /// population average and the source goes `Bad`, or `Failed` on the third
    /// consecutive error.
    pub(crate) fn record_error(&mut self, global_avg_speed: f64, now: Instant) -> SourceStatus {
        self.speed = global_avg_speed.max(0.0);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.status = self.status.on_error(self.consecutive_errors);
        self.last_error_at = Some(now);
        self.status
    }

    /// Marks the source busy and returns the new lease number. Each acquire
    /// starts a fresh lease; only its holder may report back.
    pub(crate) fn acquire(&mut self) -> Result<u64, TransitionError> {
        self.status = self.status.acquire()?;
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// True while `lease` is the most recent one handed out.
    pub(crate) fn holds(&self, lease: u64) -> bool {
        lease != 0 && self.attempts == lease
    }

    pub(crate) fn release(&mut self) {
        self.status = self.status.release();
        self.consecutive_errors = 0;
    }

    /// Smoothed speed inflated by staleness, clamped to the speed limit.
    pub fn estimated_speed(&self, boost: &UncertaintyBoost, now: Instant) -> f64 {
        let stale = now.saturating_duration_since(self.updated_at);
        let estimate = (self.speed * boost.at(stale)).max(0.0);
        if self.speed_limit > 0 {
            estimate.min(self.speed_limit as f64)
        } else {
            estimate
        }
    }

    /// Seconds since the last error minus the cooldown window; negative while
    /// still cooling down. `None` if the source never errored.
    fn cooldown_remaining_offset(&self, boost: &UncertaintyBoost, now: Instant) -> Option<f64> {
        let at = self.last_error_at?;
        let since = now.saturating_duration_since(at).as_secs_f64();
        Some(since - COOLDOWN_CHUNKS * boost.avg_chunk_secs)
    }

    pub fn in_cooldown(&self, boost: &UncertaintyBoost, now: Instant) -> bool {
        self.status == SourceStatus::Bad
            && self
                .cooldown_remaining_offset(boost, now)
                .is_some_and(|offset| offset < 0.0)
    }

    /// 1.0 unless `Bad`; then below 1.0 during the cooldown and growing past it.
    pub fn error_penalty(&self, boost: &UncertaintyBoost, now: Instant) -> f64 {
        if self.status != SourceStatus::Bad {
            return 1.0;
        }
        match self.cooldown_remaining_offset(boost, now) {
            Some(offset) => boost.at_secs(offset),
            None => 1.0,
        }
    }

    pub fn score(&self, boost: &UncertaintyBoost, now: Instant) -> f64 {
        self.estimated_speed(boost, now) * self.boost * self.error_penalty(boost, now)
    }

    pub fn snapshot(&self, boost: &UncertaintyBoost, now: Instant) -> SourceSnapshot {
        SourceSnapshot {
            id: self.id.clone(),
            host: self.host.clone(),
            is_cdn: self.is_cdn,
            status: self.status,
            speed: self.speed,
            last_speed: self.last_speed,
            score: self.score(boost, now),
            downloaded: self.downloaded,
            attempts: self.attempts,
            consecutive_errors: self.consecutive_errors,
        }
    }
}
