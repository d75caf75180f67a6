//! Command module for the dashboard
//!
//! UI-facing commands around the job run. They return `Result<T, String>` so
//! the message can be shown as-is.

pub mod job_commands;

// Re-export all commands
pub use job_commands::*;
