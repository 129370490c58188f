//! Utility functions module
//!
//! Contains helper functions for count and duration formatting,
//! and serde helpers for human-readable durations.

pub mod units;

// Re-export commonly used functions
pub use units::{
    format_count,
    format_duration,
    calculate_ops_per_sec, format_ops_rate,
};

/// Serde adapter that stores a `Duration` as a humantime string ("1s", "200ms")
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
