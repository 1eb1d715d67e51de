//! Read-only view of a source for reports and the CLI.

use super::SourceStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    pub id: String,
    pub host: String,
    pub is_cdn: bool,
    pub status: SourceStatus,
    /// Smoothed speed estimate (bytes/sec).
    pub speed: f64,
    /// Last raw measured chunk speed (bytes/sec).
    pub last_speed: f64,
    pub score: f64,
    pub downloaded: u64,
    pub attempts: u64,
    pub consecutive_errors: u32,
}
