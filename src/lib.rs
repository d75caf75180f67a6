//! FWA Review Console - job progress core
//!
//! Backend of the claims-review dashboard's batch scoring panel: it opens the
//! streamed job request, decodes the event stream and keeps the multi-phase
//! progress view consistent while events arrive.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod commands;

// Re-export commands for easier access
pub use commands::*;
