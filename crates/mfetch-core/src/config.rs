use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// One remote endpoint serving the target file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Short unique identifier used in logs and reports.
    pub id: String,
    /// Base URL; the fetched path is appended to it.
    pub host: String,
    /// Starting speed estimate in bytes/sec.
    #[serde(default)]
    pub initial_speed: f64,
    /// Bandwidth cap in bytes/sec; 0 means unlimited.
    #[serde(default)]
    pub speed_limit: u64,
    /// Static multiplier applied to the score (operator preference).
    #[serde(default = "default_boost")]
    pub boost: f64,
    /// CDN sources are only used once every direct source is slow or failed.
    #[serde(default)]
    pub is_cdn: bool,
    /// Below this smoothed speed (bytes/sec) a direct source counts as slow.
    #[serde(default)]
    pub slow_threshold: f64,
}

fn default_boost() -> f64 {
    1.0
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            initial_speed: 0.0,
            speed_limit: 0,
            boost: default_boost(),
            is_cdn: false,
            slow_threshold: 0.0,
        }
    }
}

/// Global configuration loaded from `~/.config/mfetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Bytes per chunk (one task per chunk).
    pub chunk_size: u64,
    /// Number of concurrent workers per fetch.
    pub worker_count: usize,
    /// Base of the uncertainty boost; estimates grow by this factor per
    /// average chunk duration without fresh measurements.
    pub uncertainty_growth_rate: f64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            worker_count: 4,
            uncertainty_growth_rate: 1.02,
            sources: Vec::new(),
        }
    }
}

impl FetchConfig {
    /// Checks the invariants the manager relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if !(self.uncertainty_growth_rate >= 1.0 && self.uncertainty_growth_rate.is_finite()) {
            return Err(ConfigError::GrowthRate(self.uncertainty_growth_rate));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
            let parsed = url::Url::parse(&source.host).ok();
            if parsed.as_ref().and_then(|u| u.host_str()).is_none() {
                return Err(ConfigError::InvalidHost {
                    id: source.id.clone(),
                    host: source.host.clone(),
                });
            }
            for (field, value) in [
                ("initial_speed", source.initial_speed),
                ("boost", source.boost),
                ("slow_threshold", source.slow_threshold),
            ] {
                if !(value.is_finite() && value >= 0.0) {
                    return Err(ConfigError::NegativeValue {
                        id: source.id.clone(),
                        field,
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from the XDG path, writing a default file if none exists.
///
/// The default has no sources, so it will not validate until the user adds some.
pub fn load_or_init() -> Result<FetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<FetchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: FetchConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
