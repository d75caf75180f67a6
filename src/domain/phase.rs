//! Phase catalog for the claims-scoring batch job
//!
//! The job pipeline is a fixed, ordered list of phases. The declaration order of
//! [`PhaseKey`] is the catalog order, so "earlier than" is an index comparison
//! rather than anything derived from the wire strings.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Stable identifier of a pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PhaseKey {
    /// Claims are loaded from the workspace
    Loading,
    /// Provider and member enrichment
    Enrichment,
    /// FWA rule evaluation
    Rules,
    /// Risk scoring
    Scoring,
    /// Case creation for flagged claims
    Cases,
}

impl PhaseKey {
    /// All phases in catalog order
    pub const ALL: [Self; 5] = [
        Self::Loading,
        Self::Enrichment,
        Self::Rules,
        Self::Scoring,
        Self::Cases,
    ];

    /// Position of this phase in the catalog
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Key used by the job backend on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Enrichment => "enrichment",
            Self::Rules => "rules",
            Self::Scoring => "scoring",
            Self::Cases => "cases",
        }
    }

    /// Resolve a wire key. Unknown keys map to `None` so newer producers
    /// can add phases without breaking older consoles.
    pub fn from_wire(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Label shown before the backend supplies its own
    pub const fn default_label(self) -> &'static str {
        match self {
            Self::Loading => "Loading claims",
            Self::Enrichment => "Enriching claims",
            Self::Rules => "Evaluating rules",
            Self::Scoring => "Scoring claims",
            Self::Cases => "Creating cases",
        }
    }
}

impl std::fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion state of a phase. Ordering follows the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PhaseStatus {
    Pending,
    Active,
    Complete,
}

impl PhaseStatus {
    /// Move forward to `next`; a lower status is ignored.
    pub fn advance(&mut self, next: Self) {
        if next > *self {
            *self = next;
        }
    }
}

/// Clamp a reported percentage into `[0, 100]`. NaN counts as zero.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// One stage of the job pipeline as seen by the console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub key: PhaseKey,
    pub label: String,
    /// Percentage in `[0, 100]`
    pub progress: f64,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub detail: Option<String>,
    pub status: PhaseStatus,
}

impl Phase {
    pub fn pending(key: PhaseKey) -> Self {
        Self {
            key,
            label: key.default_label().to_string(),
            progress: 0.0,
            current: None,
            total: None,
            detail: None,
            status: PhaseStatus::Pending,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == PhaseStatus::Complete
    }

    /// Force the phase to complete at 100%.
    pub fn complete(&mut self) {
        self.status.advance(PhaseStatus::Complete);
        self.progress = 100.0;
    }

    /// Record a reported percentage. A completed phase stays at 100 and an
    /// active phase never moves backwards.
    pub fn record_progress(&mut self, reported: f64) {
        if self.is_complete() {
            return;
        }
        let reported = clamp_progress(reported);
        if reported > self.progress {
            self.progress = reported;
        }
    }

    /// Mark the phase as the frontier, or complete it once it reports 100%.
    pub fn activate(&mut self) {
        if self.progress >= 100.0 {
            self.complete();
        } else {
            self.status.advance(PhaseStatus::Active);
        }
    }
}

/// Fresh catalog, every phase pending
pub fn default_catalog() -> Vec<Phase> {
    PhaseKey::ALL.into_iter().map(Phase::pending).collect()
}
