//! Job stream events
//!
//! A [`DecodedEvent`] is what the frame decoder hands over: an event name and an
//! opaque payload string. [`JobEvent::classify`] turns it into one of the typed
//! events the progress engine understands. Payloads that fail to parse are
//! dropped here and never reach the engine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Event name used when a frame carries no `event:` line
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Event names emitted by the job backend
pub mod names {
    pub const PHASE: &str = "phase";
    pub const PROGRESS: &str = "progress";
    pub const COMPLETE: &str = "complete";
}

/// One frame of the event stream after decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub event_name: String,
    pub payload: String,
}

impl DecodedEvent {
    pub fn new(event_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            payload: payload.into(),
        }
    }
}

/// Payload of a `phase` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhasePayload {
    pub phase: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Payload of a `progress` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressPayload {
    pub phase: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Final aggregate counts reported once a run finishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JobSummary {
    pub batch_id: String,
    #[serde(default)]
    pub total_claims: u64,
    #[serde(default)]
    pub professional_claims: u64,
    #[serde(default)]
    pub institutional_claims: u64,
    #[serde(default)]
    pub pharmacy_claims: u64,
    #[serde(default)]
    pub rules_evaluated: u64,
    #[serde(default)]
    pub scores_generated: u64,
    #[serde(default)]
    pub cases_created: u64,
    #[serde(default)]
    pub critical_risk: u64,
    #[serde(default)]
    pub high_risk: u64,
    #[serde(default)]
    pub medium_risk: u64,
    #[serde(default)]
    pub low_risk: u64,
    #[serde(default)]
    pub elapsed_seconds: f64,
}

/// Typed view of a decoded event
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Phase(PhasePayload),
    Progress(ProgressPayload),
    Complete(JobSummary),
    /// Unknown event name or unparseable payload
    Ignored,
}

impl JobEvent {
    pub fn classify(event: &DecodedEvent) -> Self {
        let parsed = match event.event_name.as_str() {
            names::PHASE => serde_json::from_str(&event.payload).map(Self::Phase),
            names::PROGRESS => serde_json::from_str(&event.payload).map(Self::Progress),
            names::COMPLETE => serde_json::from_str(&event.payload).map(Self::Complete),
            _ => return Self::Ignored,
        };

        parsed.unwrap_or_else(|e| {
            tracing::debug!(
                "Dropping malformed '{}' payload: {} ({})",
                event.event_name,
                e,
                event.payload
            );
            Self::Ignored
        })
    }
}
