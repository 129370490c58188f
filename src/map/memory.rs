//! In-process keyed map store
//!
//! Keeps each group as an ordered list of key-ordered blocks. A block that
//! grows past the split size is split in half, so a hot group never turns
//! into one unbounded record. Optional latency and fault injection make the
//! store useful for exercising the driver without an external database.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use crate::error::retry_async;
use crate::map::{KeyedMap, MapContext, Value, WritePolicy};
use crate::{MapLoadError, Result};

/// Default number of entries a block may hold before it is split
pub const DEFAULT_BLOCK_SPLIT_SIZE: usize = 100;

/// Simulated store behaviour
#[derive(Debug, Clone, Default)]
pub struct FaultInjection {
    /// Probability (0.0 to 1.0) that a single attempt fails
    pub failure_rate: f64,
    /// Delay added to every attempt
    pub latency: Duration,
}

impl FaultInjection {
    /// Reject a failure rate outside 0.0 to 1.0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(MapLoadError::ConfigError(format!(
                "Failure rate must be between 0.0 and 1.0, got {}",
                self.failure_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Group {
    blocks: Vec<BTreeMap<String, Value>>,
}

impl Group {
    fn insert(&mut self, key: String, value: Value, split_size: usize) {
        if self.blocks.is_empty() {
            self.blocks.push(BTreeMap::new());
        }

        // Last block whose first key is not greater than `key`
        let idx = self
            .blocks
            .partition_point(|block| {
                block
                    .keys()
                    .next()
                    .map_or(true, |first| first.as_str() <= key.as_str())
            })
            .saturating_sub(1);

        let block = &mut self.blocks[idx];
        block.insert(key, value);

        if block.len() > split_size {
            if let Some(mid) = block.keys().nth(block.len() / 2).cloned() {
                let upper = block.split_off(&mid);
                self.blocks.insert(idx + 1, upper);
            }
        }
    }

    fn len(&self) -> usize {
        self.blocks.iter().map(BTreeMap::len).sum()
    }
}

/// Block-splitting map held entirely in memory
pub struct InMemoryMap {
    groups: Mutex<HashMap<String, Group>>,
    block_split_size: usize,
    faults: FaultInjection,
    rng: Mutex<SmallRng>,
    attempts: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryMap {
    /// Create an empty map with the default block split size
    pub fn new() -> Self {
        Self::with_block_split_size(DEFAULT_BLOCK_SPLIT_SIZE)
    }

    /// Create an empty map that splits blocks above `block_split_size` entries
    pub fn with_block_split_size(block_split_size: usize) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            block_split_size: block_split_size.max(1),
            faults: FaultInjection::default(),
            rng: Mutex::new(SmallRng::seed_from_u64(0)),
            attempts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enable latency and failure simulation
    pub fn with_faults(mut self, faults: FaultInjection, seed: u64) -> Self {
        self.faults = faults;
        self.rng = Mutex::new(SmallRng::seed_from_u64(seed));
        self
    }

    /// Total number of entries across all groups
    pub fn len(&self) -> usize {
        self.lock_groups()
            .map(|groups| groups.values().map(Group::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries stored under `group_key`
    pub fn group_len(&self, group_key: &str) -> usize {
        self.lock_groups()
            .ok()
            .and_then(|groups| groups.get(group_key).map(Group::len))
            .unwrap_or(0)
    }

    /// Number of blocks `group_key` is split into
    pub fn block_count(&self, group_key: &str) -> usize {
        self.lock_groups()
            .ok()
            .and_then(|groups| groups.get(group_key).map(|g| g.blocks.len()))
            .unwrap_or(0)
    }

    /// Sub keys of `group_key` in key order
    pub fn keys(&self, group_key: &str) -> Vec<String> {
        self.lock_groups()
            .ok()
            .and_then(|groups| {
                groups.get(group_key).map(|g| {
                    g.blocks
                        .iter()
                        .flat_map(|block| block.keys().cloned())
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// Number of individual write attempts, retries included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_groups(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Group>>> {
        self.groups
            .lock()
            .map_err(|_| MapLoadError::OperationFailure("map state poisoned".to_string()))
    }

    fn should_fail(&self) -> bool {
        if self.faults.failure_rate <= 0.0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>() < self.faults.failure_rate,
            Err(_) => true,
        }
    }

    async fn attempt_put(&self, group_key: &str, sub_key: &str, value: Value) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        if self.is_closed() {
            return Err(MapLoadError::InvalidState("map is closed".to_string()));
        }

        if !self.faults.latency.is_zero() {
            tokio::time::sleep(self.faults.latency).await;
        }

        if self.should_fail() {
            return Err(MapLoadError::OperationFailure(format!(
                "injected failure writing {}/{}",
                group_key, sub_key
            )));
        }

        let mut groups = self.lock_groups()?;
        groups
            .entry(group_key.to_string())
            .or_default()
            .insert(sub_key.to_string(), value, self.block_split_size);
        Ok(())
    }
}

impl Default for InMemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyedMap for InMemoryMap {
    async fn put(
        &self,
        policy: &WritePolicy,
        group_key: &str,
        sub_key: &str,
        context: Option<&MapContext>,
        value: Value,
    ) -> Result<()> {
        let key = match context {
            Some(ctx) if !ctx.path.is_empty() => format!("{}/{}", ctx.path.join("/"), sub_key),
            _ => sub_key.to_string(),
        };
        let key = key.as_str();

        retry_async(move || self.attempt_put(group_key, key, value.clone()), policy).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_read_back_in_order() {
        let map = InMemoryMap::new();
        let policy = WritePolicy::no_retry();

        for key in ["key0000000003", "key0000000001", "key0000000002"] {
            map.put(&policy, "Key-1", key, None, Value::Integer(1)).await.unwrap();
        }

        assert_eq!(map.len(), 3);
        assert_eq!(map.group_len("Key-1"), 3);
        assert_eq!(
            map.keys("Key-1"),
            vec!["key0000000001", "key0000000002", "key0000000003"]
        );
    }

    #[tokio::test]
    async fn test_blocks_split_when_full() {
        let map = InMemoryMap::with_block_split_size(4);
        let policy = WritePolicy::no_retry();

        for i in 0..20u64 {
            let key = format!("key{:010}", i);
            map.put(&policy, "Key-0", &key, None, i.into()).await.unwrap();
        }

        assert_eq!(map.group_len("Key-0"), 20);
        assert!(map.block_count("Key-0") >= 5);

        let keys = map.keys("Key-0");
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_context_prefixes_key() {
        let map = InMemoryMap::new();
        let ctx = MapContext { path: vec!["inner".to_string()] };

        map.put(&WritePolicy::no_retry(), "Key-0", "a", Some(&ctx), Value::Integer(7))
            .await
            .unwrap();

        assert_eq!(map.keys("Key-0"), vec!["inner/a"]);
    }

    #[tokio::test]
    async fn test_always_failing_map_exhausts_retries() {
        let faults = FaultInjection { failure_rate: 1.0, latency: Duration::ZERO };
        let map = InMemoryMap::new().with_faults(faults, 7);
        let policy = WritePolicy {
            max_retries: 2,
            sleep_between_retries: Duration::from_millis(1),
            total_timeout: Duration::from_secs(1),
        };

        let result = map.put(&policy, "Key-0", "k", None, Value::Integer(0)).await;

        assert!(matches!(result, Err(MapLoadError::OperationFailure(_))));
        assert_eq!(map.attempts(), 3);
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_total_timeout_bounds_slow_writes() {
        let faults = FaultInjection { failure_rate: 0.0, latency: Duration::from_millis(200) };
        let map = InMemoryMap::new().with_faults(faults, 0);
        let policy = WritePolicy {
            max_retries: 0,
            sleep_between_retries: Duration::ZERO,
            total_timeout: Duration::from_millis(20),
        };

        let result = map.put(&policy, "Key-0", "k", None, Value::Integer(0)).await;

        assert!(matches!(result, Err(MapLoadError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_closed_map_rejects_writes_without_retry() {
        let map = InMemoryMap::new();
        map.close().await.unwrap();

        let policy = WritePolicy {
            max_retries: 3,
            sleep_between_retries: Duration::from_millis(1),
            total_timeout: Duration::ZERO,
        };
        let result = map.put(&policy, "Key-0", "k", None, Value::Integer(0)).await;

        assert!(matches!(result, Err(MapLoadError::InvalidState(_))));
        assert_eq!(map.attempts(), 1);
    }

    #[test]
    fn test_fault_injection_rejects_out_of_range_rate() {
        let valid = FaultInjection { failure_rate: 0.25, latency: Duration::ZERO };
        assert!(valid.validate().is_ok());

        for rate in [-0.1, 1.5, f64::NAN] {
            let faults = FaultInjection { failure_rate: rate, latency: Duration::ZERO };
            assert!(matches!(faults.validate(), Err(MapLoadError::ConfigError(_))));
        }
    }
}
