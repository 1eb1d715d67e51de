//! Error types shared across the fetch engine.

use thiserror::Error;

/// Failure of one ranged fetch against one source.
///
/// Every variant is handled the same way by the manager: the source's speed
/// estimate is reset and its consecutive-error counter goes up.
#[derive(Debug, Error)]
pub enum FetchError {
    /// libcurl reported an error (connect, DNS, timeout, low-speed abort).
    #[error("transport: {0}")]
    Transport(#[from] curl::Error),
    /// The source answered with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Reading the response body failed.
    #[error("read: {0}")]
    Io(#[from] std::io::Error),
    /// The transfer ended without a usable response.
    #[error("stream: {0}")]
    Stream(String),
}

/// Invalid static configuration; the manager refuses to start.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("worker_count must be greater than zero")]
    ZeroWorkers,
    #[error("uncertainty_growth_rate must be >= 1.0 (got {0})")]
    GrowthRate(f64),
    #[error("no sources configured")]
    NoSources,
    #[error("duplicate source id: {0}")]
    DuplicateSource(String),
    #[error("source {id}: invalid host {host:?}")]
    InvalidHost { id: String, host: String },
    #[error("source {id}: {field} must be finite and non-negative")]
    NegativeValue { id: String, field: &'static str },
}
