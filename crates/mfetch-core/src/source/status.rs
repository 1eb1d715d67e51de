//! Source health states and their legal transitions.

use std::fmt;

use thiserror::Error;

/// Consecutive errors after which a source is permanently excluded.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Health/availability of one source.
///
/// `Failed` is absorbing: every transition out of it is either rejected or a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceStatus {
    #[default]
    Idle,
    /// Exactly one in-flight task holds the source.
    Busy,
    /// Errored recently; subject to a cooldown before reuse.
    Bad,
    /// Too many consecutive errors; never selected again.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal source transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: SourceStatus,
    pub to: SourceStatus,
}

impl SourceStatus {
    /// Whether selection may consider this state at all (cooldown aside).
    pub fn is_selectable(self) -> bool {
        matches!(self, SourceStatus::Idle | SourceStatus::Bad)
    }

    /// `Idle | Bad -> Busy` when a task takes the source.
    pub fn acquire(self) -> Result<SourceStatus, TransitionError> {
        if self.is_selectable() {
            Ok(SourceStatus::Busy)
        } else {
            Err(TransitionError {
                from: self,
                to: SourceStatus::Busy,
            })
        }
    }

    /// Back to `Idle` after a successful use. Idempotent; `Failed` stays `Failed`.
    pub fn release(self) -> SourceStatus {
        match self {
            SourceStatus::Failed => SourceStatus::Failed,
            _ => SourceStatus::Idle,
        }
    }

    /// State after an error, given the consecutive-error count including it.
    pub fn on_error(self, consecutive_errors: u32) -> SourceStatus {
        if self == SourceStatus::Failed || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            SourceStatus::Failed
        } else {
            SourceStatus::Bad
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceStatus::Idle => "idle",
            SourceStatus::Busy => "busy",
            SourceStatus::Bad => "bad",
            SourceStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
