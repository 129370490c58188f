//! Load generation engine
//!
//! Contains the shared counters, per-worker work generation, the worker
//! loop, liveness tracking and the coordinator that drives a run.

pub mod coordinator;
pub mod generator;
pub mod health;
pub mod metrics;
pub mod worker;

// Re-export commonly used types
pub use coordinator::{Coordinator, CoordinatorState, StopHandle};
pub use generator::{format_unique_key, WorkGenerator, WorkItem};
pub use health::{HealthMonitor, HealthReport, LivenessTable};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use worker::{SharedState, Worker, WorkerInfo, WorkerStats, WorkerStatus};
