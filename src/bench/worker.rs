//! Load worker
//!
//! A worker is one long-lived task that loops: draw a work item, write it
//! to the map, count the outcome, stamp its liveness slot. It checks the
//! shared termination flag once per iteration at the loop head and never
//! abandons a write already in flight. A failed write is counted and logged
//! and the loop carries on. A store that panics inside `put` counts as a
//! failed write too.

use std::any::Any;
use std::future::{poll_fn, Future};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use crate::bench::generator::WorkGenerator;
use crate::bench::health::LivenessTable;
use crate::bench::metrics::MetricsRegistry;
use crate::map::{KeyedMap, WritePolicy};
use crate::{MapLoadError, Result};

/// Worker status for tracking individual worker states
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStatus {
    /// Worker has not been spawned yet
    Idle,
    /// Worker is looping
    Running,
    /// Worker observed the termination flag and exited
    Completed,
    /// Worker task panicked or could not be joined
    Failed(String),
    /// Worker was still running when the drain timeout expired
    Aborted,
}

/// Coordinator-side record of one worker
#[derive(Debug)]
pub struct WorkerInfo {
    /// Unique worker ID
    pub id: usize,
    /// Current status of the worker
    pub status: WorkerStatus,
    /// Join handle for the worker task
    pub handle: Option<JoinHandle<WorkerStats>>,
    /// Counts returned by the worker on exit
    pub stats: Option<WorkerStats>,
}

impl WorkerInfo {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            handle: None,
            stats: None,
        }
    }

    /// Check if the worker is active (running)
    pub fn is_active(&self) -> bool {
        matches!(self.status, WorkerStatus::Running)
    }

    /// Check if the worker is done, whatever the outcome
    pub fn is_completed(&self) -> bool {
        matches!(
            self.status,
            WorkerStatus::Completed | WorkerStatus::Failed(_) | WorkerStatus::Aborted
        )
    }
}

/// Per-worker outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
}

/// State shared by every worker of a run
#[derive(Clone)]
pub struct SharedState {
    pub map: Arc<dyn KeyedMap>,
    pub metrics: Arc<MetricsRegistry>,
    pub liveness: Arc<LivenessTable>,
    pub terminate: Arc<AtomicBool>,
}

pub struct Worker {
    id: usize,
    policy: WritePolicy,
    generator: WorkGenerator,
    shared: SharedState,
}

impl Worker {
    pub fn new(id: usize, policy: WritePolicy, generator: WorkGenerator, shared: SharedState) -> Self {
        Self {
            id,
            policy,
            generator,
            shared,
        }
    }

    /// Run until the termination flag is observed at the loop head
    pub async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats {
            worker_id: self.id,
            ..WorkerStats::default()
        };

        tracing::debug!(worker_id = self.id, "Worker started");

        while !self.shared.terminate.load(Ordering::Acquire) {
            let item = self.generator.next();
            stats.attempts += 1;

            let call = self
                .shared
                .map
                .put(&self.policy, &item.group_key, &item.unique_key, None, item.value);
            let outcome = catch_panic(call).await;

            match outcome {
                Ok(()) => {
                    self.shared.metrics.record_success();
                    self.shared.liveness.record(self.id);
                    stats.successes += 1;
                }
                Err(e) => {
                    self.shared.metrics.record_error();
                    self.shared.liveness.record(self.id);
                    stats.errors += 1;
                    tracing::warn!(
                        worker_id = self.id,
                        group_key = %item.group_key,
                        unique_key = %item.unique_key,
                        error = %e,
                        "Put failed"
                    );
                }
            }

            // A store that completes synchronously would otherwise pin this
            // runtime thread and starve the coordinator.
            tokio::task::yield_now().await;
        }

        tracing::debug!(
            worker_id = self.id,
            attempts = stats.attempts,
            successes = stats.successes,
            errors = stats.errors,
            "Worker finished"
        );

        stats
    }
}

/// Resolve to `call`'s output, or to `OperationFailure` if polling it panics.
/// A panicked future is dropped without being polled again.
async fn catch_panic<F>(call: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let mut call = std::pin::pin!(call);
    poll_fn(|cx| match panic::catch_unwind(AssertUnwindSafe(|| call.as_mut().poll(cx))) {
        Ok(poll) => poll,
        Err(payload) => Poll::Ready(Err(MapLoadError::OperationFailure(format!(
            "put panicked: {}",
            panic_message(payload.as_ref())
        )))),
    })
    .await
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
