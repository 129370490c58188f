//! Shared run counters
//!
//! Success and error counts plus the global key sequence. Every field is a
//! lock-free atomic so all workers update them without contention.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub successes: u64,
    pub errors: u64,
}

impl MetricsSnapshot {
    /// Number of completed attempts
    pub fn attempts(&self) -> u64 {
        self.successes + self.errors
    }
}

/// Atomic counters shared by every worker and the coordinator
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    successes: AtomicU64,
    errors: AtomicU64,
    sequence: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Claim the next key sequence number. The first value issued is 1.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Highest sequence number issued so far
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            successes: self.successes(),
            errors: self.errors(),
        }
    }
}
