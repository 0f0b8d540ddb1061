//! Configuration structures for the FLEX feed converter.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Interval;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed decoding configuration.
    pub feed: FeedConfig,
    /// Output store configuration.
    pub store: StoreConfig,
    /// Resampling configuration.
    pub resample: ResampleConfig,
    /// Remote retrieval configuration.
    pub fetch: FetchConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail deep inside a pass.
    pub fn validate(&self) -> Result<()> {
        if self.store.batch_rows == 0 {
            return Err(Error::config("store.batch_rows must be at least 1"));
        }
        if self.store.extension.is_empty() {
            return Err(Error::config("store.extension must not be empty"));
        }
        if self.resample.parallel_batch == 0 {
            return Err(Error::config("resample.parallel_batch must be at least 1"));
        }
        self.resample.interval()?;
        Ok(())
    }
}

/// Feed decoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Offset of the session's local time from UTC, in seconds.
    /// Feed timestamps are local wall-clock times.
    pub utc_offset_secs: i64,
    /// Log progress every this many input bytes.
    pub progress_step_bytes: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: 9 * 3_600,
            progress_step_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Output store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Rows buffered per series before they are appended to the store.
    pub batch_rows: usize,
    /// Suffix inserted before the extension of raw output files.
    pub raw_suffix: String,
    /// Extension of store files.
    pub extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_rows: 4_096,
            raw_suffix: String::new(),
            extension: "duckdb".to_string(),
        }
    }
}

/// Resampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Default bar interval (e.g. "1s", "5min").
    pub default_interval: String,
    /// Securities loaded and aggregated together per parallel round.
    pub parallel_batch: usize,
}

impl ResampleConfig {
    /// Parsed default interval.
    pub fn interval(&self) -> Result<Interval> {
        self.default_interval.parse()
    }
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            default_interval: "1s".to_string(),
            parallel_batch: 64,
        }
    }
}

/// Remote retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// URL scheme ("https" or "http").
    pub scheme: String,
    /// Default port.
    pub port: u16,
    /// Environment variable holding the password.
    pub password_env: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: 443,
            password_env: "FLEX_FETCH_PASSWORD".to_string(),
        }
    }
}
