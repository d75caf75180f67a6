//! Application layer - Job run orchestration
//!
//! This module drives job runs against the streaming backend and holds the
//! state the UI command layer works with.

pub mod job_monitor;
pub mod state;

// Re-export commonly used items
pub use job_monitor::{JobMonitor, JobMonitorError, JobParameters};
pub use state::AppState;
