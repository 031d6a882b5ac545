//! Outcome of a batch computation.

use serde::Serialize;

use crate::signal::SignalId;

/// A signal with the reason it produced no values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSignal {
    pub signal_id: SignalId,
    pub reason: String,
}

/// What `compute_all_signals` did with each signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Freshly computed, in evaluation order.
    pub computed: Vec<SignalId>,
    /// Already had a valid result.
    pub cached: Vec<SignalId>,
    /// Upstream data missing; left uncomputed.
    pub unavailable: Vec<SkippedSignal>,
    /// Computation raised an error.
    pub failed: Vec<SkippedSignal>,
    pub disabled: Vec<SignalId>,
    /// On or downstream of a dependency cycle.
    pub blocked: Vec<SignalId>,
    /// Already in flight elsewhere, or invalidated mid-computation.
    pub superseded: Vec<SignalId>,
}

impl BatchReport {
    /// Number of signals the batch looked at.
    pub fn total(&self) -> usize {
        self.computed.len()
            + self.cached.len()
            + self.unavailable.len()
            + self.failed.len()
            + self.disabled.len()
            + self.blocked.len()
            + self.superseded.len()
    }

    /// True when nothing failed or was blocked.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}
