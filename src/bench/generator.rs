//! Per-worker work generation
//!
//! Each worker owns a generator with a private PRNG seeded from its id, so
//! the sequence of group keys a worker draws is reproducible across runs.
//! Unique keys come from the shared atomic sequence and need no further
//! coordination.

use std::sync::Arc;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use crate::bench::metrics::MetricsRegistry;
use crate::map::Value;

/// Width of the zero-padded numeric part of a unique key
pub const UNIQUE_KEY_WIDTH: usize = 10;

const UNIQUE_KEY_MODULUS: u64 = 10_000_000_000;

/// One unit of work for a worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub group_key: String,
    pub unique_key: String,
    pub value: Value,
}

/// Format a sequence number as `prefix` followed by 10 zero-padded digits.
///
/// Numbers wider than 10 digits keep their last 10 digits.
pub fn format_unique_key(prefix: &str, sequence: u64) -> String {
    format!(
        "{}{:0width$}",
        prefix,
        sequence % UNIQUE_KEY_MODULUS,
        width = UNIQUE_KEY_WIDTH
    )
}

/// Draws work items for a single worker
pub struct WorkGenerator {
    rng: SmallRng,
    num_keys: u64,
    group_prefix: String,
    key_prefix: String,
    metrics: Arc<MetricsRegistry>,
}

impl WorkGenerator {
    pub fn new(
        worker_id: usize,
        num_keys: u64,
        group_prefix: impl Into<String>,
        key_prefix: impl Into<String>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(worker_id as u64),
            num_keys: num_keys.max(1),
            group_prefix: group_prefix.into(),
            key_prefix: key_prefix.into(),
            metrics,
        }
    }

    /// Draw the next group index from this worker's stream
    pub fn next_group(&mut self) -> u64 {
        self.rng.gen_range(0..self.num_keys)
    }

    pub fn next(&mut self) -> WorkItem {
        let group = self.next_group();
        let sequence = self.metrics.next_sequence();

        WorkItem {
            group_key: format!("{}{}", self.group_prefix, group),
            unique_key: format_unique_key(&self.key_prefix, sequence),
            value: Value::Integer(self.metrics.successes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(worker_id: usize, num_keys: u64) -> WorkGenerator {
        WorkGenerator::new(worker_id, num_keys, "Key-", "key", Arc::new(MetricsRegistry::new()))
    }

    #[test]
    fn test_format_unique_key() {
        assert_eq!(format_unique_key("key", 42), "key0000000042");
        assert_eq!(format_unique_key("key", 1), "key0000000001");
        assert_eq!(format_unique_key("", 9_999_999_999), "9999999999");
        assert_eq!(format_unique_key("key", 12_345_678_901), "key2345678901");
    }

    #[test]
    fn test_group_draws_are_reproducible_per_seed() {
        let mut first = generator(3, 1000);
        let mut second = generator(3, 1000);

        let a: Vec<u64> = (0..100).map(|_| first.next_group()).collect();
        let b: Vec<u64> = (0..100).map(|_| second.next_group()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_workers_draw_different_streams() {
        let mut first = generator(0, 1_000_000);
        let mut second = generator(1, 1_000_000);

        let a: Vec<u64> = (0..32).map(|_| first.next_group()).collect();
        let b: Vec<u64> = (0..32).map(|_| second.next_group()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_groups_stay_within_keyspace() {
        let mut gen = generator(5, 7);
        for _ in 0..1000 {
            assert!(gen.next_group() < 7);
        }
    }

    #[test]
    fn test_next_pairs_group_with_unique_key() {
        let metrics = Arc::new(MetricsRegistry::new());
        metrics.record_success();
        let mut gen = WorkGenerator::new(0, 1, "Key-", "key", Arc::clone(&metrics));

        let item = gen.next();
        assert_eq!(item.group_key, "Key-0");
        assert_eq!(item.unique_key, "key0000000001");
        assert_eq!(item.value, Value::Integer(1));

        let item = gen.next();
        assert_eq!(item.unique_key, "key0000000002");
    }
}
