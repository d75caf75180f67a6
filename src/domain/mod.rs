//! Domain module - Core job progress logic
//!
//! This module contains the phase catalog, the typed job stream events and the
//! progress engine that reduces them into the view rendered by the console.

pub mod events;
pub mod phase;
pub mod progress_engine;

// Re-export commonly used items
pub use events::{DecodedEvent, JobEvent, JobSummary};
pub use phase::{Phase, PhaseKey, PhaseStatus};
pub use progress_engine::{
    reduce, EngineInput, FailureKind, ProgressSnapshot, RunFailure, RunState,
};
