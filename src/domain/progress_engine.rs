//! Phase progress engine
//!
//! Reduces the ordered sequence of stream events of one job run into the view
//! the console renders. The engine is a plain state machine: [`reduce`] (or
//! [`ProgressSnapshot::apply`]) takes the previous snapshot and one input and
//! produces the next snapshot. It performs no I/O and reads no clock, so every
//! rule below can be exercised without a transport or a UI.
//!
//! Rules:
//! - Naming a phase in a `phase` or `progress` event completes every earlier
//!   phase of the catalog (completion cascade).
//! - Phase status only moves forward: pending → active → complete.
//! - Events naming a phase outside the catalog are ignored.
//! - A `complete` event completes every phase and ends the run.
//! - Once the run is terminal the snapshot is frozen until the next
//!   [`EngineInput::RunStarted`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use crate::domain::events::{DecodedEvent, JobEvent, JobSummary, PhasePayload, ProgressPayload};
use crate::domain::phase::{clamp_progress, default_catalog, Phase, PhaseKey, PhaseStatus};

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Why a run ended in [`RunState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FailureKind {
    /// The request exceeded its time budget; the job may still be running
    Timeout,
    /// The backend rejected the request before streaming
    HttpStatus,
    /// Connection or body read failure
    Transport,
    /// The stream closed without a completion event
    IncompleteStream,
}

/// Failure captured for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn incomplete_stream() -> Self {
        Self::new(
            FailureKind::IncompleteStream,
            "The job stream closed before the job reported completion",
        )
    }
}

/// Everything that can move the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    /// A new run begins; previous state is discarded
    RunStarted {
        run_id: Uuid,
        started_at: DateTime<Utc>,
    },
    /// One decoded frame, in stream order
    Event(DecodedEvent),
    /// The response body ended normally
    StreamClosed,
    /// The transport failed
    TransportFailed(RunFailure),
    /// The driver's cancellation fired
    Cancelled,
}

/// Authoritative progress view of the current run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    run_id: Option<Uuid>,
    run_state: RunState,
    phases: Vec<Phase>,
    summary: Option<JobSummary>,
    failure: Option<RunFailure>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    events_applied: u64,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            run_id: None,
            run_state: RunState::NotStarted,
            phases: default_catalog(),
            summary: None,
            failure: None,
            started_at: None,
            finished_at: None,
            events_applied: 0,
        }
    }
}

/// Pure transition: previous snapshot and one input in, next snapshot out.
pub fn reduce(mut state: ProgressSnapshot, input: &EngineInput) -> ProgressSnapshot {
    state.apply(input);
    state
}

impl ProgressSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Phases in catalog order
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, key: PhaseKey) -> &Phase {
        &self.phases[key.index()]
    }

    pub const fn summary(&self) -> Option<&JobSummary> {
        self.summary.as_ref()
    }

    pub const fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Number of decoded events that reached the engine during this run
    pub const fn events_applied(&self) -> u64 {
        self.events_applied
    }

    /// First active phase, if any
    pub fn frontier(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.status == PhaseStatus::Active)
    }

    /// Mean of the clamped phase percentages
    #[allow(clippy::cast_precision_loss)]
    pub fn overall_progress(&self) -> f64 {
        let sum: f64 = self.phases.iter().map(|p| clamp_progress(p.progress)).sum();
        sum / self.phases.len() as f64
    }

    /// Wall time of the run, up to `now` while it is still running
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let started = self.started_at?;
        Some(self.finished_at.unwrap_or(now) - started)
    }

    /// Record when the run reached its terminal state. Only the first stamp sticks.
    pub fn stamp_finished(&mut self, at: DateTime<Utc>) {
        if self.run_state.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(at);
        }
    }

    pub fn apply(&mut self, input: &EngineInput) {
        match input {
            EngineInput::RunStarted { run_id, started_at } => {
                *self = Self {
                    run_id: Some(*run_id),
                    run_state: RunState::Running,
                    started_at: Some(*started_at),
                    ..Self::default()
                };
            }
            _ if self.run_state != RunState::Running => {
                debug!("Ignoring {:?} in state {:?}", input, self.run_state);
            }
            EngineInput::Event(event) => {
                self.events_applied += 1;
                self.apply_event(event);
            }
            EngineInput::StreamClosed => {
                self.fail(RunFailure::incomplete_stream());
            }
            EngineInput::TransportFailed(failure) => {
                self.fail(failure.clone());
            }
            EngineInput::Cancelled => {
                self.run_state = RunState::Cancelled;
            }
        }
    }

    fn apply_event(&mut self, event: &DecodedEvent) {
        match JobEvent::classify(event) {
            JobEvent::Phase(payload) => self.apply_phase(payload),
            JobEvent::Progress(payload) => self.apply_progress(payload),
            JobEvent::Complete(summary) => self.apply_complete(summary),
            JobEvent::Ignored => {}
        }
    }

    fn apply_phase(&mut self, payload: PhasePayload) {
        let Some(key) = self.resolve(&payload.phase) else {
            return;
        };
        self.complete_before(key);

        let phase = &mut self.phases[key.index()];
        if let Some(label) = payload.label {
            phase.label = label;
        }
        if let Some(progress) = payload.progress {
            phase.record_progress(progress);
        }
        phase.activate();
    }

    fn apply_progress(&mut self, payload: ProgressPayload) {
        let Some(key) = self.resolve(&payload.phase) else {
            return;
        };
        self.complete_before(key);

        let phase = &mut self.phases[key.index()];
        if payload.current.is_some() {
            phase.current = payload.current;
        }
        if payload.total.is_some() {
            phase.total = payload.total;
        }
        if payload.detail.is_some() {
            phase.detail = payload.detail;
        }
        if let Some(progress) = payload.progress {
            phase.record_progress(progress);
        }
        phase.activate();
    }

    fn apply_complete(&mut self, summary: JobSummary) {
        for phase in &mut self.phases {
            phase.complete();
        }
        info!(
            "✅ Job run completed: batch={} claims={} cases={}",
            summary.batch_id, summary.total_claims, summary.cases_created
        );
        self.summary = Some(summary);
        self.run_state = RunState::Completed;
    }

    fn resolve(&self, wire_key: &str) -> Option<PhaseKey> {
        let key = PhaseKey::from_wire(wire_key);
        if key.is_none() {
            debug!("Ignoring event for unknown phase '{}'", wire_key);
        }
        key
    }

    /// Completion cascade: everything strictly earlier than `key` is done.
    fn complete_before(&mut self, key: PhaseKey) {
        for phase in &mut self.phases[..key.index()] {
            if !phase.is_complete() {
                phase.complete();
            }
        }
    }

    fn fail(&mut self, failure: RunFailure) {
        tracing::warn!("Job run failed ({:?}): {}", failure.kind, failure.message);
        self.failure = Some(failure);
        self.run_state = RunState::Failed;
    }
}
