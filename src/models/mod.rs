//! Data models module
//!
//! Contains the progress and summary reports produced by a run.

pub mod report;

// Re-export commonly used types
pub use report::{ProgressReport, RunSummary};
