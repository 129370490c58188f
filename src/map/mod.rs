//! Keyed map store abstraction
//!
//! The load generator only ever talks to a store through [`KeyedMap`].
//! A store owns its own concurrency discipline and its own retry
//! semantics; callers hand it a [`WritePolicy`] per call.

use std::fmt;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::Result;

pub mod memory;

pub use memory::{FaultInjection, InMemoryMap};

/// Retry and timeout policy for a single write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WritePolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between retries
    #[serde(with = "crate::util::humantime_serde")]
    pub sleep_between_retries: Duration,
    /// Upper bound for the whole write, retries included. Zero means unbounded.
    #[serde(with = "crate::util::humantime_serde")]
    pub total_timeout: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            sleep_between_retries: Duration::from_millis(200),
            total_timeout: Duration::from_secs(5),
        }
    }
}

impl WritePolicy {
    /// Policy that tries exactly once with no timeout
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            sleep_between_retries: Duration::ZERO,
            total_timeout: Duration::ZERO,
        }
    }
}

/// Opaque location of a nested map within a group.
///
/// The load generator always writes at the top level and passes `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapContext {
    pub path: Vec<String>,
}

/// Value written under a sub key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Integer(u64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v)
    }
}

/// A keyed map store addressed by a bounded group key and a unique sub key.
///
/// Implementations must tolerate concurrent `put` calls from every worker.
#[async_trait]
pub trait KeyedMap: Send + Sync {
    /// Write `value` under `sub_key` within `group_key`.
    ///
    /// An `Err` means the write failed after the store exhausted `policy`.
    async fn put(
        &self,
        policy: &WritePolicy,
        group_key: &str,
        sub_key: &str,
        context: Option<&MapContext>,
        value: Value,
    ) -> Result<()>;

    /// Release the underlying client
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Short human-readable name for logs
    fn name(&self) -> &str;
}
