//! Configuration management module
//!
//! Handles loading, saving, and validation of load-run configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::map::WritePolicy;
use crate::{MapLoadError, Result, APP_NAME, CONFIG_FILE};

/// Upper bound on the worker pool size
pub const MAX_THREADS: usize = 1024;

/// Load-run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of concurrent workers
    pub thread_count: usize,
    /// Size of the group keyspace workers draw from
    pub num_keys: u64,
    /// Successful writes after which the run drains
    pub target_volume: u64,
    /// A worker with no attempt for longer than this is reported unhealthy
    #[serde(with = "crate::util::humantime_serde")]
    pub stale_threshold: Duration,
    /// Pause between progress reports
    #[serde(with = "crate::util::humantime_serde")]
    pub sample_interval: Duration,
    /// Upper bound on waiting for workers to exit once draining
    #[serde(with = "crate::util::humantime_serde")]
    pub drain_timeout: Duration,
    /// Pause after the drain before the final summary
    #[serde(with = "crate::util::humantime_serde")]
    pub settle_delay: Duration,
    /// Prefix of the bounded group keys ("Key-17")
    pub group_prefix: String,
    /// Prefix of the unique sub keys ("key0000000042")
    pub key_prefix: String,
    /// Retry policy handed to the map on every write
    pub write_policy: WritePolicy,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            thread_count: 60,
            num_keys: 1000,
            target_volume: 1_000_000,
            stale_threshold: Duration::from_secs(1),
            sample_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(300),
            settle_delay: Duration::from_secs(2),
            group_prefix: "Key-".to_string(),
            key_prefix: "key".to_string(),
            write_policy: WritePolicy::default(),
        }
    }
}

impl LoadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(MapLoadError::ConfigError(
                "Thread count must be greater than 0".to_string()
            ));
        }

        if self.thread_count > MAX_THREADS {
            return Err(MapLoadError::ConfigError(
                format!("Too many threads: {} (max: {})", self.thread_count, MAX_THREADS)
            ));
        }

        if self.num_keys == 0 {
            return Err(MapLoadError::ConfigError(
                "Keyspace size must be greater than 0".to_string()
            ));
        }

        if self.target_volume == 0 {
            return Err(MapLoadError::ConfigError(
                "Target volume must be greater than 0".to_string()
            ));
        }

        if self.sample_interval.is_zero() {
            return Err(MapLoadError::ConfigError(
                "Sample interval must be greater than 0".to_string()
            ));
        }

        if self.drain_timeout.is_zero() {
            return Err(MapLoadError::ConfigError(
                "Drain timeout must be greater than 0".to_string()
            ));
        }

        Ok(())
    }

    /// Set the number of workers
    pub fn with_thread_count(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Set the group keyspace size
    pub fn with_num_keys(mut self, num_keys: u64) -> Self {
        self.num_keys = num_keys;
        self
    }

    /// Set the success target
    pub fn with_target_volume(mut self, target: u64) -> Self {
        self.target_volume = target;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| MapLoadError::ConfigError(
                format!("Failed to read config file {}: {}", path.display(), e)
            ))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MapLoadError::ConfigError(
                format!("Failed to parse config file {}: {}", path.display(), e)
            ))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from the standard config file location.
    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load(&config_path)
    }

    /// Validate and save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MapLoadError::ConfigError(
                    format!("Failed to create config directory {}: {}", parent.display(), e)
                ))?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content)
            .map_err(|e| MapLoadError::ConfigError(
                format!("Failed to write config file {}: {}", path.display(), e)
            ))?;

        Ok(())
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/mapload/mapload.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MapLoadError::ConfigError(
                "Unable to determine config directory".to_string()
            ))?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
