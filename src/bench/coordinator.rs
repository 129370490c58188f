//! Run coordinator
//!
//! Owns the worker pool for one run and walks it through
//! `Init -> Running -> Draining -> Stopped`:
//!
//! - `start` spawns exactly one task per worker id and closes the pool.
//! - `run` samples the counters every interval, publishes a
//!   [`ProgressReport`], and once the success target is reached raises the
//!   termination flag and drains the pool.
//! - `drain` waits for every worker to finish its current write and exit,
//!   bounded by the configured drain timeout. Expiry is fatal.
//! - `finish` waits out the settle delay, builds the [`RunSummary`] and
//!   closes the map handle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use tokio::sync::mpsc;
use crate::bench::generator::WorkGenerator;
use crate::bench::health::{HealthMonitor, LivenessTable};
use crate::bench::metrics::MetricsRegistry;
use crate::bench::worker::{SharedState, Worker, WorkerInfo, WorkerStats, WorkerStatus};
use crate::config::LoadConfig;
use crate::map::KeyedMap;
use crate::models::{ProgressReport, RunSummary};
use crate::{MapLoadError, Result};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Init,
    Running,
    Draining,
    Stopped,
}

/// Cloneable handle to the run's termination flag
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Raise the flag. Returns `true` only for the call that raised it.
    pub fn stop(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

pub struct Coordinator {
    config: LoadConfig,
    state: CoordinatorState,
    shared: SharedState,
    monitor: HealthMonitor,
    workers: Vec<WorkerInfo>,
    start_time: Option<Instant>,
    drained_after: Option<Duration>,
}

impl Coordinator {
    /// Create a coordinator for an already constructed map handle
    pub fn new(config: LoadConfig, map: Arc<dyn KeyedMap>) -> Result<Self> {
        config.validate()?;

        let shared = SharedState {
            map,
            metrics: Arc::new(MetricsRegistry::new()),
            liveness: Arc::new(LivenessTable::new(config.thread_count)),
            terminate: Arc::new(AtomicBool::new(false)),
        };
        let monitor = HealthMonitor::new(config.stale_threshold);

        Ok(Self {
            config,
            state: CoordinatorState::Init,
            shared,
            monitor,
            workers: Vec::new(),
            start_time: None,
            drained_after: None,
        })
    }

    /// Build the map handle with `connect`, then create the coordinator.
    ///
    /// A connect failure surfaces as `StartupFailure` and no worker is spawned.
    pub async fn connect<F, Fut>(config: LoadConfig, connect: F) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn KeyedMap>>>,
    {
        config.validate()?;

        let map = connect().await.map_err(|e| match e {
            MapLoadError::StartupFailure(msg) => MapLoadError::StartupFailure(msg),
            other => MapLoadError::StartupFailure(other.to_string()),
        })?;

        tracing::info!(map = map.name(), "Connected to map store");
        Self::new(config, map)
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.shared.metrics
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.shared.terminate),
        }
    }

    /// Time since `start`, zero before it
    pub fn elapsed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Spawn one task per worker id. The pool takes no further workers.
    pub fn start(&mut self) -> Result<()> {
        if self.state != CoordinatorState::Init {
            return Err(MapLoadError::InvalidState(format!(
                "cannot start a run in state {:?}",
                self.state
            )));
        }

        self.start_time = Some(Instant::now());
        self.workers = (0..self.config.thread_count).map(WorkerInfo::new).collect();

        for info in self.workers.iter_mut() {
            let generator = WorkGenerator::new(
                info.id,
                self.config.num_keys,
                self.config.group_prefix.clone(),
                self.config.key_prefix.clone(),
                Arc::clone(&self.shared.metrics),
            );
            let worker = Worker::new(
                info.id,
                self.config.write_policy.clone(),
                generator,
                self.shared.clone(),
            );

            info.handle = Some(tokio::spawn(worker.run()));
            info.status = WorkerStatus::Running;
        }

        self.state = CoordinatorState::Running;
        tracing::info!(
            workers = self.config.thread_count,
            target = self.config.target_volume,
            map = self.shared.map.name(),
            "Load run started"
        );

        Ok(())
    }

    /// Sample counters and health right now
    pub fn progress(&self) -> ProgressReport {
        ProgressReport {
            elapsed: self.elapsed(),
            counts: self.shared.metrics.snapshot(),
            health: self.monitor.report(&self.shared.liveness),
        }
    }

    pub fn target_reached(&self) -> bool {
        self.shared.metrics.successes() >= self.config.target_volume
    }

    /// Raise the termination flag. Returns `true` only the first time.
    pub fn request_stop(&self) -> bool {
        self.stop_handle().stop()
    }

    /// Drive a full run: start, report every interval, drain, summarize.
    ///
    /// Reports are offered to `progress_tx` without waiting. A report that
    /// finds the channel full is skipped and a closed receiver doesn't stop
    /// the run.
    pub async fn run(&mut self, progress_tx: mpsc::Sender<ProgressReport>) -> Result<RunSummary> {
        self.start()?;

        let mut reporting = true;
        loop {
            tokio::time::sleep(self.config.sample_interval).await;

            let report = self.progress();
            let target_met = report.counts.successes >= self.config.target_volume;

            if reporting {
                match progress_tx.try_send(report) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Progress receiver is behind, skipping report");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!("Progress receiver dropped, continuing without reports");
                        reporting = false;
                    }
                }
            }

            if target_met {
                tracing::info!(
                    successes = self.shared.metrics.successes(),
                    target = self.config.target_volume,
                    "Target volume reached"
                );
                break;
            }

            if self.stop_handle().is_stopped() {
                tracing::info!("Stop requested before target volume");
                break;
            }
        }

        self.request_stop();
        let workers = self.drain().await?;
        self.finish(workers).await
    }

    /// Raise the flag and wait for every worker to exit.
    ///
    /// Workers still running when the drain timeout expires are aborted,
    /// the map is closed, and `DrainTimeout` is returned.
    pub async fn drain(&mut self) -> Result<Vec<WorkerStats>> {
        if self.state != CoordinatorState::Running {
            return Err(MapLoadError::InvalidState(format!(
                "cannot drain a run in state {:?}",
                self.state
            )));
        }

        self.request_stop();
        self.state = CoordinatorState::Draining;
        tracing::info!(timeout = ?self.config.drain_timeout, "Draining workers");

        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut failure = None;

        for info in self.workers.iter_mut() {
            let Some(handle) = info.handle.as_mut() else {
                continue;
            };

            let outcome = tokio::time::timeout_at(deadline, handle).await;
            match outcome {
                Ok(Ok(stats)) => {
                    info.status = WorkerStatus::Completed;
                    info.stats = Some(stats);
                    info.handle = None;
                }
                Ok(Err(e)) => {
                    tracing::error!(worker_id = info.id, error = %e, "Worker task failed");
                    info.status = WorkerStatus::Failed(e.to_string());
                    info.handle = None;
                    failure.get_or_insert_with(|| {
                        MapLoadError::WorkerError(format!("worker {} failed: {}", info.id, e))
                    });
                }
                Err(_) => break,
            }
        }

        let mut stuck_workers = 0;
        for info in self.workers.iter_mut() {
            if let Some(handle) = info.handle.take() {
                handle.abort();
                info.status = WorkerStatus::Aborted;
                stuck_workers += 1;
            }
        }

        self.drained_after = Some(self.elapsed());

        if stuck_workers > 0 {
            tracing::error!(
                stuck_workers,
                timeout = ?self.config.drain_timeout,
                "Workers did not exit before the drain timeout"
            );
            self.close_map().await;
            self.state = CoordinatorState::Stopped;
            return Err(MapLoadError::DrainTimeout {
                stuck_workers,
                timeout: self.config.drain_timeout,
            });
        }

        if let Some(err) = failure {
            self.close_map().await;
            self.state = CoordinatorState::Stopped;
            return Err(err);
        }

        Ok(self
            .workers
            .iter()
            .filter_map(|info| info.stats.clone())
            .collect())
    }

    /// Let trailing updates land, build the summary and release the map
    pub async fn finish(&mut self, workers: Vec<WorkerStats>) -> Result<RunSummary> {
        if self.state != CoordinatorState::Draining {
            return Err(MapLoadError::InvalidState(format!(
                "cannot finish a run in state {:?}",
                self.state
            )));
        }

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let counts = self.shared.metrics.snapshot();
        let summary = RunSummary {
            timestamp: Utc::now(),
            config: self.config.clone(),
            map_name: self.shared.map.name().to_string(),
            successes: counts.successes,
            errors: counts.errors,
            keys_issued: self.shared.metrics.sequence(),
            elapsed: self.drained_after.unwrap_or_else(|| self.elapsed()),
            workers,
        };

        self.close_map().await;
        self.state = CoordinatorState::Stopped;
        tracing::info!(
            successes = summary.successes,
            errors = summary.errors,
            elapsed = ?summary.elapsed,
            "Load run finished"
        );

        Ok(summary)
    }

    async fn close_map(&self) {
        if let Err(e) = self.shared.map.close().await {
            tracing::warn!(map = self.shared.map.name(), error = %e, "Failed to close map");
        }
    }

    pub fn worker_statuses(&self) -> Vec<(usize, WorkerStatus)> {
        self.workers.iter().map(|w| (w.id, w.status.clone())).collect()
    }

    pub fn active_worker_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_active()).count()
    }

    pub fn all_workers_completed(&self) -> bool {
        self.workers.iter().all(|w| w.is_completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{InMemoryMap, WritePolicy};

    fn fast_config(threads: usize, target: u64) -> LoadConfig {
        LoadConfig::new()
            .with_thread_count(threads)
            .with_num_keys(4)
            .with_target_volume(target)
            .with_sample_interval(Duration::from_millis(10))
            .with_settle_delay(Duration::ZERO)
            .with_drain_timeout(Duration::from_secs(5))
            .with_write_policy(WritePolicy::no_retry())
    }

    #[tokio::test]
    async fn test_coordinator_creation() {
        let coordinator = Coordinator::new(fast_config(2, 10), Arc::new(InMemoryMap::new())).unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Init);
        assert_eq!(coordinator.active_worker_count(), 0);
        assert!(coordinator.all_workers_completed());
        assert_eq!(coordinator.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = Coordinator::new(fast_config(0, 10), Arc::new(InMemoryMap::new()));
        assert!(matches!(result, Err(MapLoadError::ConfigError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_twice_is_rejected() {
        let mut coordinator = Coordinator::new(fast_config(2, 10), Arc::new(InMemoryMap::new())).unwrap();

        coordinator.start().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Running);
        assert_eq!(coordinator.active_worker_count(), 2);
        assert!(matches!(coordinator.start(), Err(MapLoadError::InvalidState(_))));

        coordinator.drain().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_before_start_is_rejected() {
        let mut coordinator = Coordinator::new(fast_config(1, 10), Arc::new(InMemoryMap::new())).unwrap();
        assert!(matches!(coordinator.drain().await, Err(MapLoadError::InvalidState(_))));
    }

    #[test]
    fn test_stop_handle_raises_once() {
        let handle = StopHandle { flag: Arc::new(AtomicBool::new(false)) };
        let other = handle.clone();

        assert!(!other.is_stopped());
        assert!(handle.stop());
        assert!(!other.stop());
        assert!(other.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_run_reaches_target_and_drains() {
        let map = Arc::new(InMemoryMap::new());
        let mut coordinator = Coordinator::new(fast_config(4, 200), map.clone()).unwrap();
        let (progress_tx, mut progress_rx) = mpsc::channel(1024);

        let summary = coordinator.run(progress_tx).await.unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(coordinator.all_workers_completed());
        assert!(summary.successes >= 200);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.workers.len(), 4);
        assert_eq!(summary.worker_attempts(), summary.attempts());
        assert_eq!(summary.keys_issued, summary.attempts());
        assert_eq!(map.len() as u64, summary.successes);
        assert!(map.is_closed());

        let mut reports = Vec::new();
        while let Ok(report) = progress_rx.try_recv() {
            reports.push(report);
        }
        assert!(!reports.is_empty());
        for report in &reports {
            assert_eq!(report.health.len(), 4);
        }
        assert!(reports.last().unwrap().counts.successes >= 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_survives_dropped_progress_receiver() {
        let mut coordinator = Coordinator::new(fast_config(2, 50), Arc::new(InMemoryMap::new())).unwrap();
        let (progress_tx, progress_rx) = mpsc::channel(1);
        drop(progress_rx);

        let summary = coordinator.run(progress_tx).await.unwrap();
        assert!(summary.successes >= 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_progress_channel_does_not_stall_run() {
        let mut coordinator = Coordinator::new(fast_config(2, 200), Arc::new(InMemoryMap::new())).unwrap();
        let (progress_tx, mut progress_rx) = mpsc::channel(1);

        let summary = tokio::time::timeout(Duration::from_secs(10), coordinator.run(progress_tx))
            .await
            .expect("run stalled on a full progress channel")
            .unwrap();

        assert!(summary.successes >= 200);
        assert!(progress_rx.try_recv().is_ok());
        assert!(progress_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_external_stop_drains_before_target() {
        let mut coordinator =
            Coordinator::new(fast_config(2, u64::MAX), Arc::new(InMemoryMap::new())).unwrap();
        let stop = coordinator.stop_handle();
        let (progress_tx, _progress_rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.stop();
        });

        let summary = coordinator.run(progress_tx).await.unwrap();
        assert_eq!(summary.worker_attempts(), summary.attempts());
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    }
}
