//! mapload - keyed map load generator
//!
//! Drives a fixed pool of concurrent writers against a keyed map store,
//! reports throughput and per-worker health once per interval, and drains
//! the pool cooperatively once a target volume of writes has succeeded.

use std::fmt;
use std::time::Duration;

pub mod bench;
pub mod config;
pub mod map;
pub mod models;
pub mod simple;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum MapLoadError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// A put failed after exhausting its retry policy
    OperationFailure(String),
    /// A put exceeded its total timeout
    Timeout(Duration),
    /// Workers did not exit within the drain timeout
    DrainTimeout {
        /// Number of workers still running when the timeout expired
        stuck_workers: usize,
        /// The configured drain timeout
        timeout: Duration,
    },
    /// The map handle could not be constructed
    StartupFailure(String),
    /// Summary could not be serialized
    SerializationError(String),
    /// Worker task panicked or could not be joined
    WorkerError(String),
    /// Coordinator used out of lifecycle order
    InvalidState(String),
}

impl fmt::Display for MapLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapLoadError::IoError(err) => write!(f, "I/O error: {}", err),
            MapLoadError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            MapLoadError::OperationFailure(msg) => write!(f, "Operation failed: {}", msg),
            MapLoadError::Timeout(after) => {
                write!(f, "Operation timed out after {}", humantime::format_duration(*after))
            }
            MapLoadError::DrainTimeout { stuck_workers, timeout } => write!(
                f,
                "Drain timed out after {} with {} worker(s) still running",
                humantime::format_duration(*timeout),
                stuck_workers
            ),
            MapLoadError::StartupFailure(msg) => write!(f, "Startup failed: {}", msg),
            MapLoadError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            MapLoadError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            MapLoadError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for MapLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MapLoadError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MapLoadError {
    fn from(err: std::io::Error) -> Self {
        MapLoadError::IoError(err)
    }
}

impl From<serde_json::Error> for MapLoadError {
    fn from(err: serde_json::Error) -> Self {
        MapLoadError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for MapLoadError {
    fn from(err: toml::de::Error) -> Self {
        MapLoadError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for MapLoadError {
    fn from(err: toml::ser::Error) -> Self {
        MapLoadError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for mapload operations
pub type Result<T> = std::result::Result<T, MapLoadError>;

/// Error handling utilities
pub mod error {
    use super::{MapLoadError, Result};
    use crate::map::WritePolicy;
    use std::future::Future;
    use tokio::time::{sleep, timeout};

    /// Retry a fallible async operation under a write policy.
    ///
    /// The operation runs at most `max_retries + 1` times with a fixed
    /// `sleep_between_retries` pause between attempts. The whole sequence,
    /// pauses included, is bounded by `total_timeout`; a zero total timeout
    /// means unbounded.
    pub async fn retry_async<F, Fut, T>(operation: F, policy: &WritePolicy) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = async {
            let mut last_error = None;

            for attempt in 0..=policy.max_retries {
                match operation().await {
                    Ok(result) => return Ok(result),
                    Err(err) => {
                        let retryable = is_retryable_error(&err);
                        last_error = Some(err);
                        if !retryable {
                            break;
                        }

                        // Don't sleep after the last attempt
                        if attempt < policy.max_retries && !policy.sleep_between_retries.is_zero() {
                            sleep(policy.sleep_between_retries).await;
                        }
                    }
                }
            }

            Err(last_error.unwrap_or_else(|| {
                MapLoadError::OperationFailure("Retry failed with no error".to_string())
            }))
        };

        if policy.total_timeout.is_zero() {
            return attempts.await;
        }

        match timeout(policy.total_timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(MapLoadError::Timeout(policy.total_timeout)),
        }
    }

    /// Check if an error is retryable
    pub fn is_retryable_error(error: &MapLoadError) -> bool {
        match error {
            MapLoadError::IoError(io_err) => {
                matches!(
                    io_err.kind(),
                    std::io::ErrorKind::Interrupted
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::ConnectionReset
                )
            }
            MapLoadError::OperationFailure(_) => true,
            MapLoadError::Timeout(_) => true,

            MapLoadError::ConfigError(_) => false,
            MapLoadError::StartupFailure(_) => false,
            MapLoadError::InvalidState(_) => false,
            MapLoadError::DrainTimeout { .. } => false,

            _ => true,
        }
    }

    /// Convert error to a short operator-facing message
    pub fn user_friendly_message(error: &MapLoadError) -> String {
        match error {
            MapLoadError::StartupFailure(_) => {
                "Could not connect to the map store. Check the store address and that it is running."
                    .to_string()
            }
            MapLoadError::DrainTimeout { .. } => {
                "Some workers never finished their last write. The store may be unresponsive."
                    .to_string()
            }
            MapLoadError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "mapload";
pub const CONFIG_FILE: &str = "mapload.toml";

/// Marker for a worker that wrote within the stale threshold
pub const HEALTHY_MARKER: char = '.';
/// Marker for a worker that has not written within the stale threshold
pub const UNHEALTHY_MARKER: char = 'X';
