//! Signal definition table
//!
//! Keeps definitions in insertion order, which the scheduler uses to break
//! ordering ties. Mutations that would close a `derived` cycle are rejected
//! before anything is changed.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{SignalDefinition, SignalDraft, SignalId, SignalUpdate};
use crate::error::{Result, SignalError};
use crate::graph::ComputationGraph;

/// CRUD over signal definitions.
#[derive(Debug, Clone)]
pub struct SignalDefinitionStore {
    signals: Vec<SignalDefinition>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Default for SignalDefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDefinitionStore {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            signals: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Rebuild a store from persisted definitions without cycle checks.
    pub fn from_parts(
        signals: Vec<SignalDefinition>,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            signals,
            created_at,
            modified_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// All definitions in insertion order.
    pub fn signals(&self) -> &[SignalDefinition] {
        &self.signals
    }

    pub fn graph(&self) -> ComputationGraph {
        ComputationGraph::from_definitions(&self.signals)
    }

    /// Add a definition and return its id.
    pub fn add_signal(&mut self, draft: SignalDraft) -> Result<SignalId> {
        let now = Utc::now();
        let definition = draft.into_definition(now);
        definition.validate()?;
        if self.position(&definition.id).is_some() {
            return Err(SignalError::InvalidDefinition {
                reason: format!("signal id '{}' already exists", definition.id),
            });
        }

        let mut candidate = self.signals.clone();
        candidate.push(definition);
        let id = check_acyclic(&candidate, candidate.len() - 1)?;

        self.signals = candidate;
        self.modified_at = now;
        info!(signal_id = %id, "signal added");
        Ok(id)
    }

    /// Apply `update` to `id`. Returns `Ok(false)` when `id` is unknown.
    pub fn update_signal(&mut self, id: &SignalId, update: SignalUpdate) -> Result<bool> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };

        let now = Utc::now();
        let mut updated = self.signals[index].clone();
        update.apply_to(&mut updated, now);
        updated.validate()?;

        let mut candidate = self.signals.clone();
        candidate[index] = updated;
        check_acyclic(&candidate, index)?;

        self.signals = candidate;
        self.modified_at = now;
        info!(signal_id = %id, "signal updated");
        Ok(true)
    }

    /// Remove `id`, returning the removed definition.
    pub fn remove_signal(&mut self, id: &SignalId) -> Option<SignalDefinition> {
        let index = self.position(id)?;
        let removed = self.signals.remove(index);
        self.modified_at = Utc::now();
        info!(signal_id = %id, "signal removed");
        Some(removed)
    }

    pub fn get_signal_by_id(&self, id: &SignalId) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| &s.id == id)
    }

    pub fn get_enabled_signals(&self) -> Vec<&SignalDefinition> {
        self.signals.iter().filter(|s| s.enabled).collect()
    }

    /// Replace the whole table, e.g. after loading a persisted structure.
    pub fn replace_all(
        &mut self,
        signals: Vec<SignalDefinition>,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) {
        *self = Self::from_parts(signals, created_at, modified_at);
    }

    fn position(&self, id: &SignalId) -> Option<usize> {
        self.signals.iter().position(|s| &s.id == id)
    }
}

/// Reject `candidate` if the definition at `index` sits on a cycle.
fn check_acyclic(candidate: &[SignalDefinition], index: usize) -> Result<SignalId> {
    let id = candidate[index].id.clone();
    let graph = ComputationGraph::from_definitions(candidate);
    match graph.cycle_through(&id) {
        Some(cycle) => Err(SignalError::CyclicDependency {
            signal_id: id,
            cycle,
        }),
        None => Ok(id),
    }
}
