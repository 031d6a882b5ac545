//! Epoch-tagged result cache
//!
//! Every signal id has a generation number. An entry is readable only while
//! its epoch equals the id's current generation, so invalidation never has to
//! touch the stored results themselves.
//!
//! Generations come from one monotonically increasing counter:
//! - `invalidate(id)` moves `id` to a fresh generation
//! - `invalidate_all()` raises a global floor above every per-id generation
//! - the current generation of `id` is `max(local[id], floor)`
//!
//! Writes carry the generation that was current when the computation
//! started; a write whose generation has since moved is rejected and counted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{Result, SignalError};
use crate::graph::ComputationGraph;
use crate::signal::{SignalId, SignalResult, SignalStatus};

#[derive(Default)]
struct CacheState {
    entries: HashMap<SignalId, Arc<SignalResult>>,
    local_epochs: HashMap<SignalId, u64>,
    floor: u64,
    counter: u64,
    computing: HashSet<SignalId>,
}

impl CacheState {
    fn epoch_of(&self, id: &SignalId) -> u64 {
        self.local_epochs
            .get(id)
            .copied()
            .unwrap_or(0)
            .max(self.floor)
    }

    fn bump(&mut self, id: &SignalId) -> u64 {
        self.counter += 1;
        self.local_epochs.insert(id.clone(), self.counter);
        self.counter
    }
}

/// Keyed store of the latest result per signal.
#[derive(Default)]
pub struct ResultCache {
    state: RwLock<CacheState>,
    stale_writes: AtomicU64,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation of `id`.
    pub fn current_epoch(&self, id: &SignalId) -> u64 {
        self.read().epoch_of(id)
    }

    /// The cached result of `id`, if it is still valid.
    pub fn get(&self, id: &SignalId) -> Option<Arc<SignalResult>> {
        let state = self.read();
        let entry = state.entries.get(id)?;
        (entry.epoch == state.epoch_of(id)).then(|| Arc::clone(entry))
    }

    /// Whether `id` has no valid result to serve.
    pub fn needs_compute(&self, id: &SignalId) -> bool {
        self.get(id)
            .map_or(true, |result| result.status == SignalStatus::Uncomputed)
    }

    /// Store `result` under the current generation of `id`.
    pub fn set(&self, id: &SignalId, mut result: SignalResult) -> Arc<SignalResult> {
        let mut state = self.write();
        result.epoch = state.epoch_of(id);
        let result = Arc::new(result);
        state.entries.insert(id.clone(), Arc::clone(&result));
        result
    }

    /// Store `result` only if its signal is still at `started_epoch`.
    pub fn commit(&self, mut result: SignalResult, started_epoch: u64) -> Result<Arc<SignalResult>> {
        let id = result.definition_id.clone();
        let mut state = self.write();
        let current_epoch = state.epoch_of(&id);
        if current_epoch != started_epoch {
            drop(state);
            self.stale_writes.fetch_add(1, Ordering::Relaxed);
            debug!(
                signal_id = %id,
                started_epoch,
                current_epoch,
                "discarding stale write"
            );
            return Err(SignalError::StaleWrite {
                signal_id: id,
                started_epoch,
                current_epoch,
            });
        }
        result.epoch = started_epoch;
        let result = Arc::new(result);
        state.entries.insert(id, Arc::clone(&result));
        Ok(result)
    }

    /// Move `id` to a fresh generation. Returns the new epoch.
    pub fn invalidate(&self, id: &SignalId) -> u64 {
        let epoch = self.write().bump(id);
        debug!(signal_id = %id, epoch, "invalidated");
        epoch
    }

    /// Invalidate `id` and everything downstream of it in `graph`.
    pub fn invalidate_cascade(&self, id: &SignalId, graph: &ComputationGraph) -> Vec<SignalId> {
        let affected = graph.cascade_invalidate(id);
        self.invalidate_many(&affected);
        affected
    }

    pub fn invalidate_many(&self, ids: &[SignalId]) {
        let mut state = self.write();
        for id in ids {
            let epoch = state.bump(id);
            debug!(signal_id = %id, epoch, "invalidated");
        }
    }

    /// Logically invalidate every entry.
    pub fn invalidate_all(&self) -> u64 {
        let mut state = self.write();
        state.counter += 1;
        state.floor = state.counter;
        debug!(epoch = state.floor, "invalidated all results");
        state.floor
    }

    /// Drop the entry and generation of a removed signal.
    pub fn evict(&self, id: &SignalId) {
        let mut state = self.write();
        state.entries.remove(id);
        // Keep the id past any epoch a pending computation may hold.
        state.counter += 1;
        let counter = state.counter;
        state.local_epochs.insert(id.clone(), counter);
    }

    pub fn is_computing(&self, id: &SignalId) -> bool {
        self.read().computing.contains(id)
    }

    /// Set or clear the in-flight marker. Returns false if setting an id
    /// that is already in flight.
    pub fn set_computing(&self, id: &SignalId, computing: bool) -> bool {
        let mut state = self.write();
        if computing {
            state.computing.insert(id.clone())
        } else {
            state.computing.remove(id);
            true
        }
    }

    /// Claim the in-flight marker for `id`, released when the guard drops.
    pub fn begin_computing(&self, id: &SignalId) -> Option<ComputeGuard<'_>> {
        self.set_computing(id, true).then(|| ComputeGuard {
            cache: self,
            id: id.clone(),
        })
    }

    /// Number of writes discarded because their signal was invalidated
    /// while they were in flight.
    pub fn stale_write_count(&self) -> u64 {
        self.stale_writes.load(Ordering::Relaxed)
    }

    /// Number of stored entries, valid or not.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

/// Holds the in-flight marker of one signal.
pub struct ComputeGuard<'a> {
    cache: &'a ResultCache,
    id: SignalId,
}

impl ComputeGuard<'_> {
    pub fn id(&self) -> &SignalId {
        &self.id
    }
}

impl Drop for ComputeGuard<'_> {
    fn drop(&mut self) {
        self.cache.set_computing(&self.id, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn computed(id: &str, epoch: u64) -> SignalResult {
        SignalResult {
            definition_id: SignalId::from(id),
            status: SignalStatus::Computed,
            times: vec![0.0, 1.0],
            values: vec![0.0, 1.0],
            raw_values: None,
            value_range: None,
            percentile_range: None,
            message: None,
            computed_at: Utc::now(),
            epoch,
        }
    }

    #[test]
    fn test_set_then_get() {
        let cache = ResultCache::new();
        let id = SignalId::from("a");
        assert!(cache.get(&id).is_none());
        assert!(cache.needs_compute(&id));

        cache.set(&id, computed("a", 99));
        let hit = cache.get(&id).unwrap();
        assert_eq!(hit.epoch, cache.current_epoch(&id));
        assert!(!cache.needs_compute(&id));
    }

    #[test]
    fn test_invalidate_hides_entry() {
        let cache = ResultCache::new();
        let a = SignalId::from("a");
        let b = SignalId::from("b");
        cache.set(&a, computed("a", 0));
        cache.set(&b, computed("b", 0));

        cache.invalidate(&a);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_all_then_recompute() {
        let cache = ResultCache::new();
        let a = SignalId::from("a");
        cache.invalidate(&a);
        cache.set(&a, computed("a", 0));

        let floor = cache.invalidate_all();
        assert!(cache.get(&a).is_none());
        assert_eq!(cache.current_epoch(&a), floor);

        // A later single invalidation still moves past the floor.
        cache.set(&a, computed("a", 0));
        assert!(cache.get(&a).is_some());
        assert!(cache.invalidate(&a) > floor);
        assert!(cache.get(&a).is_none());
    }

    #[test]
    fn test_stale_commit_rejected_and_counted() {
        let cache = ResultCache::new();
        let a = SignalId::from("a");
        let started = cache.current_epoch(&a);
        cache.invalidate(&a);

        let err = cache.commit(computed("a", 0), started).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(cache.stale_write_count(), 1);
        assert!(cache.get(&a).is_none());

        let started = cache.current_epoch(&a);
        assert!(cache.commit(computed("a", 0), started).is_ok());
        assert_eq!(cache.stale_write_count(), 1);
    }

    #[test]
    fn test_evict_rejects_pending_write() {
        let cache = ResultCache::new();
        let a = SignalId::from("a");
        let started = cache.current_epoch(&a);
        cache.set(&a, computed("a", 0));
        cache.evict(&a);
        assert!(cache.is_empty());
        assert!(cache.commit(computed("a", 0), started).is_err());
    }

    #[test]
    fn test_compute_guard_is_exclusive() {
        let cache = ResultCache::new();
        let a = SignalId::from("a");
        {
            let guard = cache.begin_computing(&a).unwrap();
            assert_eq!(guard.id(), &a);
            assert!(cache.is_computing(&a));
            assert!(cache.begin_computing(&a).is_none());
            assert!(cache.begin_computing(&SignalId::from("b")).is_some());
        }
        assert!(!cache.is_computing(&a));
    }
}
