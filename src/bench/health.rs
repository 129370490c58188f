//! Worker liveness tracking
//!
//! Every worker owns one slot in the [`LivenessTable`] and stamps it after
//! each attempt, successful or not. The [`HealthMonitor`] reads the table
//! and flags workers whose last stamp is older than the stale threshold.
//! Reports are observational only and never feed back into scheduling.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use crate::{HEALTHY_MARKER, UNHEALTHY_MARKER};

/// One atomic timestamp slot per worker.
///
/// Slots hold nanoseconds since the table's epoch and start at zero, so a
/// worker that never completes an attempt turns stale one threshold after
/// the run starts.
#[derive(Debug)]
pub struct LivenessTable {
    epoch: Instant,
    slots: Vec<AtomicU64>,
}

impl LivenessTable {
    pub fn new(workers: usize) -> Self {
        Self::with_epoch(workers, Instant::now())
    }

    pub fn with_epoch(workers: usize, epoch: Instant) -> Self {
        Self {
            epoch,
            slots: (0..workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Time since the table's epoch
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Stamp `worker_id`'s slot with the current time
    pub fn record(&self, worker_id: usize) {
        self.record_at(worker_id, self.elapsed());
    }

    /// Stamp `worker_id`'s slot with an explicit offset from the epoch
    pub fn record_at(&self, worker_id: usize, at: Duration) {
        if let Some(slot) = self.slots.get(worker_id) {
            slot.store(at.as_nanos() as u64, Ordering::Release);
        }
    }

    /// Last stamp of `worker_id`, as an offset from the epoch
    pub fn last(&self, worker_id: usize) -> Option<Duration> {
        self.slots
            .get(worker_id)
            .map(|slot| Duration::from_nanos(slot.load(Ordering::Acquire)))
    }
}

/// Per-worker health string, one marker per worker in id order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    markers: String,
}

impl HealthReport {
    pub fn len(&self) -> usize {
        self.markers.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.markers
    }

    pub fn is_healthy(&self, worker_id: usize) -> bool {
        self.markers.chars().nth(worker_id) == Some(HEALTHY_MARKER)
    }

    pub fn healthy_count(&self) -> usize {
        self.markers.chars().filter(|c| *c == HEALTHY_MARKER).count()
    }

    pub fn unhealthy_workers(&self) -> Vec<usize> {
        self.markers
            .chars()
            .enumerate()
            .filter(|(_, c)| *c == UNHEALTHY_MARKER)
            .map(|(id, _)| id)
            .collect()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.markers)
    }
}

/// Derives health reports from a liveness table
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    stale_threshold: Duration,
}

impl HealthMonitor {
    pub fn new(stale_threshold: Duration) -> Self {
        Self { stale_threshold }
    }

    /// Report as of `now`, an offset from the table's epoch
    pub fn report_at(&self, now: Duration, table: &LivenessTable) -> HealthReport {
        let markers = (0..table.len())
            .map(|id| {
                let last = table.last(id).unwrap_or_default();
                if now.saturating_sub(last) > self.stale_threshold {
                    UNHEALTHY_MARKER
                } else {
                    HEALTHY_MARKER
                }
            })
            .collect();

        HealthReport { markers }
    }

    pub fn report(&self, table: &LivenessTable) -> HealthReport {
        self.report_at(table.elapsed(), table)
    }
}
