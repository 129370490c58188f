//! Run report data models
//!
//! Contains the periodic progress line and the end-of-run summary, which
//! the binary can also print as JSON.

use std::fmt;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::bench::health::HealthReport;
use crate::bench::metrics::MetricsSnapshot;
use crate::bench::worker::WorkerStats;
use crate::config::LoadConfig;
use crate::util::units::{calculate_ops_per_sec, format_count, format_duration, format_ops_rate};

/// One sampling-interval progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Time since the run started
    pub elapsed: Duration,
    /// Counter values at sampling time
    pub counts: MetricsSnapshot,
    /// Per-worker health at sampling time
    pub health: HealthReport,
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ms: Success: {}  Failed: {}  Thread Health: {}",
            format_count(self.elapsed.as_millis() as u64),
            format_count(self.counts.successes),
            format_count(self.counts.errors),
            self.health
        )
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Configuration the run used
    pub config: LoadConfig,
    /// Name of the map store under load
    pub map_name: String,
    pub successes: u64,
    pub errors: u64,
    /// Number of unique keys handed out
    pub keys_issued: u64,
    /// Time from start until the pool was drained
    #[serde(with = "crate::util::humantime_serde")]
    pub elapsed: Duration,
    /// Per-worker counts, in worker id order
    pub workers: Vec<WorkerStats>,
}

impl RunSummary {
    pub fn attempts(&self) -> u64 {
        self.successes + self.errors
    }

    /// Successful writes per second over the whole run
    pub fn ops_per_sec(&self) -> f64 {
        calculate_ops_per_sec(self.successes, self.elapsed)
    }

    /// Fraction of attempts that succeeded (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.attempts() == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts() as f64
        }
    }

    /// Sum of the attempts each worker reported for itself
    pub fn worker_attempts(&self) -> u64 {
        self.workers.iter().map(|w| w.attempts).sum()
    }

    /// Longer human-readable description for history listings
    pub fn describe(&self) -> String {
        format!(
            "{} - {} - {} workers - {} ok / {} failed in {} ({})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.map_name,
            self.config.thread_count,
            format_count(self.successes),
            format_count(self.errors),
            format_duration(self.elapsed),
            format_ops_rate(self.ops_per_sec())
        )
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done: Success: {}  Failed: {}",
            format_count(self.successes),
            format_count(self.errors)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::health::{HealthMonitor, LivenessTable};

    fn summary(successes: u64, errors: u64) -> RunSummary {
        RunSummary {
            timestamp: Utc::now(),
            config: LoadConfig::default(),
            map_name: "in-memory".to_string(),
            successes,
            errors,
            keys_issued: successes + errors,
            elapsed: Duration::from_secs(2),
            workers: vec![
                WorkerStats { worker_id: 0, attempts: 3, successes: 2, errors: 1 },
                WorkerStats { worker_id: 1, attempts: 4, successes: 4, errors: 0 },
            ],
        }
    }

    #[test]
    fn test_progress_line_format() {
        let table = LivenessTable::new(3);
        table.record_at(1, Duration::from_millis(1500));
        let health = HealthMonitor::new(Duration::from_secs(1))
            .report_at(Duration::from_millis(2001), &table);

        let report = ProgressReport {
            elapsed: Duration::from_millis(2001),
            counts: MetricsSnapshot { successes: 1_234_567, errors: 3 },
            health,
        };

        assert_eq!(
            report.to_string(),
            "2,001ms: Success: 1,234,567  Failed: 3  Thread Health: X.X"
        );
    }

    #[test]
    fn test_final_line_format() {
        assert_eq!(summary(5, 0).to_string(), "Done: Success: 5  Failed: 0");
        assert_eq!(summary(1_000_000, 12).to_string(), "Done: Success: 1,000,000  Failed: 12");
    }

    #[test]
    fn test_summary_rates() {
        let s = summary(6, 1);
        assert_eq!(s.attempts(), 7);
        assert_eq!(s.worker_attempts(), 7);
        assert!((s.ops_per_sec() - 3.0).abs() < 1e-9);
        assert!((s.success_rate() - 6.0 / 7.0).abs() < 1e-9);
        assert_eq!(summary(0, 0).success_rate(), 0.0);
    }

    #[test]
    fn test_summary_json_round_trip() {
        let s = summary(6, 1);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"elapsed\":\"2s\""));

        let parsed: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.successes, 6);
        assert_eq!(parsed.workers, s.workers);
        assert_eq!(parsed.elapsed, s.elapsed);
    }
}
