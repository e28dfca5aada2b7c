//! # Configuration Management Module
//!
//! Static settings loaded once at process start. Nothing here is reconfigured at
//! runtime: the [`CorrelationConfig`] is validated and then moved into the
//! correlation store, which keeps it for its whole lifetime.
//!
//! ## Configuration Structure
//!
//! - [`CorrelationConfig`] - temporal window, sanity margin, display guard, retention bounds
//! - [`NodeConfig`] - our own node as shown at the end of every route
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshtrace::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("window: {}s", config.correlation.temporal_window_seconds);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [correlation]
//! temporal_window_seconds = 3.0
//! path_len_sanity_margin = 5
//! display_guard_factor = 2
//! archive_max_entries = 500
//! archive_max_age_seconds = 600.0
//!
//! [node]
//! name = "Me"
//!
//! [logging]
//! level = "info"
//! file = "meshtrace.log"
//! ```
//!
//! Every `[correlation]` key is optional and falls back to its default, and a
//! missing `[node]` or `[logging]` section is filled in the same way.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning for the correlation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Half-width of the window (seconds) around a message in which a frame may match it.
    #[serde(default = "default_temporal_window")]
    pub temporal_window_seconds: f64,
    /// Slack added to a message's reported hop count when validating a frame's chain length.
    #[serde(default = "default_sanity_margin")]
    pub path_len_sanity_margin: usize,
    /// Render-time veto: a route longer than `factor * reported_hops` is dropped.
    /// Deliberately separate from the sanity margin.
    #[serde(default = "default_guard_factor")]
    pub display_guard_factor: usize,
    /// How far back (seconds) the ingestion buffer keeps frames for forward/retroactive matching.
    #[serde(default = "default_buffer_horizon")]
    pub buffer_horizon_seconds: f64,
    #[serde(default = "default_archive_max_entries")]
    pub archive_max_entries: usize,
    #[serde(default = "default_archive_max_age")]
    pub archive_max_age_seconds: f64,
    /// Number of keys each deduplicator seen-set remembers.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Width of the timestamp bucket mixed into content fingerprints.
    #[serde(default = "default_dedup_bucket")]
    pub dedup_bucket_seconds: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_temporal_window() -> f64 {
    3.0
}

fn default_sanity_margin() -> usize {
    5
}

fn default_guard_factor() -> usize {
    2
}

fn default_buffer_horizon() -> f64 {
    30.0
}

fn default_archive_max_entries() -> usize {
    500
}

fn default_archive_max_age() -> f64 {
    600.0
}

fn default_dedup_capacity() -> usize {
    200
}

fn default_dedup_bucket() -> u64 {
    60
}

fn default_max_messages() -> usize {
    1000
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            temporal_window_seconds: default_temporal_window(),
            path_len_sanity_margin: default_sanity_margin(),
            display_guard_factor: default_guard_factor(),
            buffer_horizon_seconds: default_buffer_horizon(),
            archive_max_entries: default_archive_max_entries(),
            archive_max_age_seconds: default_archive_max_age(),
            dedup_capacity: default_dedup_capacity(),
            dedup_bucket_seconds: default_dedup_bucket(),
            max_messages: default_max_messages(),
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (field, value) in [
            ("temporal_window_seconds", self.temporal_window_seconds),
            ("buffer_horizon_seconds", self.buffer_horizon_seconds),
            ("archive_max_age_seconds", self.archive_max_age_seconds),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveSeconds { field, value });
            }
        }
        for (field, value) in [
            ("display_guard_factor", self.display_guard_factor),
            ("archive_max_entries", self.archive_max_entries),
            ("dedup_capacity", self.dedup_capacity),
            ("max_messages", self.max_messages),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { field });
            }
        }
        if self.dedup_bucket_seconds == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "dedup_bucket_seconds",
            });
        }
        if self.buffer_horizon_seconds < self.temporal_window_seconds {
            return Err(ConfigError::HorizonShorterThanWindow {
                horizon: self.buffer_horizon_seconds,
                window: self.temporal_window_seconds,
            });
        }
        Ok(())
    }
}

/// Our own node: the final hop of every rendered route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default)]
    pub adv_lat: f64,
    #[serde(default)]
    pub adv_lon: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "Me".to_string(),
            adv_lat: 0.0,
            adv_lon: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("meshtrace.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.correlation.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            correlation: CorrelationConfig::default(),
            node: NodeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
