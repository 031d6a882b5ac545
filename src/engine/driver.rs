//! Computation driver
//!
//! [`SignalEngine`] is the composition root for derived signals. It owns the
//! definition table and the result cache, holds the external collaborators,
//! and listens on the invalidation bus for upstream changes.
//!
//! Lock order is band owners, then store, then cache. No lock is held while
//! a source is resolved or while events are published.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::report::{BatchReport, SkippedSignal};
use super::resolve::{self, SourceContext};
use super::routing::{self, BandOwners};
use crate::bus::{panic_message, Subscription};
use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::error::{Result, SignalError};
use crate::graph::CycleError;
use crate::invalidation::{InvalidationBus, InvalidationEvent};
use crate::pipeline::{self, PipelineOutput};
use crate::providers::{
    AudioAnalysisProvider, BandDefinitionProvider, EventStreamProvider, FrequencyBand,
    InMemoryAnalysis,
};
use crate::signal::{
    SignalDefinition, SignalDefinitionStore, SignalDraft, SignalId, SignalResult, SignalStatus,
    SignalUpdate,
};
use crate::state::{DefinitionStructure, PersistenceCollaborator};

/// Listener id the engine registers on the invalidation bus.
pub const ENGINE_LISTENER: &str = "signal-engine";

const CYCLE_BLOCKED_REASON: &str = "blocked by a dependency cycle";

struct EngineCore {
    store: RwLock<SignalDefinitionStore>,
    cache: ResultCache,
    bus: InvalidationBus,
    analysis: Arc<dyn AudioAnalysisProvider>,
    streams: Arc<dyn EventStreamProvider>,
    bands: Option<Arc<dyn BandDefinitionProvider>>,
    band_owners: Mutex<BandOwners>,
    persistence: Option<Arc<dyn PersistenceCollaborator>>,
    config: EngineConfig,
}

impl EngineCore {
    fn store(&self) -> RwLockReadGuard<'_, SignalDefinitionStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_mut(&self) -> RwLockWriteGuard<'_, SignalDefinitionStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invalidate whatever an upstream event touches, cascading downstream.
    fn on_invalidation(&self, event: &InvalidationEvent) -> Result<()> {
        if event.is_definition_event() {
            return Ok(());
        }

        let listed = self.listed_bands(event);
        let (roots, graph) = {
            let mut owners = self.band_owners.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(event, InvalidationEvent::AudioSourceChanged { .. }) {
                owners.learn(&listed);
            }
            let store = self.store();
            let roots = routing::affected_signals(store.signals(), event, &owners);
            owners.observe(event, &listed);
            (roots, store.graph())
        };
        if roots.is_empty() {
            debug!(event = event.name(), "no derived signals affected");
            return Ok(());
        }

        let mut seen = HashSet::new();
        let affected: Vec<SignalId> = roots
            .iter()
            .flat_map(|root| graph.cascade_invalidate(root))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        self.cache.invalidate_many(&affected);
        info!(
            event = event.name(),
            signals = affected.len(),
            "upstream change invalidated derived signals"
        );
        Ok(())
    }

    /// Bands the provider currently lists for the source a source-scoped
    /// event names.
    fn listed_bands(&self, event: &InvalidationEvent) -> Vec<FrequencyBand> {
        let source_id = match event {
            InvalidationEvent::AudioSourceChanged { audio_source_id } => audio_source_id,
            InvalidationEvent::StructureImported { source_id } => source_id,
            _ => return Vec::new(),
        };
        self.bands
            .as_ref()
            .map(|bands| bands.get_bands_for_source(source_id))
            .unwrap_or_default()
    }

    fn sync_persistence(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let structure = DefinitionStructure::from_store(&self.store());
        if let Err(err) = persistence.sync_definitions(&structure) {
            warn!(error = %err, "failed to sync definitions");
        }
    }
}

/// Builder for [`SignalEngine`].
#[derive(Default)]
pub struct SignalEngineBuilder {
    analysis: Option<Arc<dyn AudioAnalysisProvider>>,
    streams: Option<Arc<dyn EventStreamProvider>>,
    bands: Option<Arc<dyn BandDefinitionProvider>>,
    persistence: Option<Arc<dyn PersistenceCollaborator>>,
    bus: Option<InvalidationBus>,
    config: EngineConfig,
}

impl SignalEngineBuilder {
    pub fn analysis(mut self, analysis: Arc<dyn AudioAnalysisProvider>) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn streams(mut self, streams: Arc<dyn EventStreamProvider>) -> Self {
        self.streams = Some(streams);
        self
    }

    /// Band lookup used to scope audio source and structure events.
    ///
    /// Band events still reach the engine only through the bus; see
    /// [`bridge_band_events`](crate::providers::bridge_band_events).
    pub fn bands(mut self, bands: Arc<dyn BandDefinitionProvider>) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceCollaborator>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Share an existing bus instead of creating one.
    pub fn bus(mut self, bus: InvalidationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and subscribe the engine to the bus.
    pub fn build(self) -> Result<SignalEngine> {
        self.config.validate()?;

        let empty = Arc::new(InMemoryAnalysis::new());
        let analysis = self
            .analysis
            .unwrap_or_else(|| Arc::clone(&empty) as Arc<dyn AudioAnalysisProvider>);
        let streams = self
            .streams
            .unwrap_or_else(|| empty as Arc<dyn EventStreamProvider>);

        let core = Arc::new(EngineCore {
            store: RwLock::new(SignalDefinitionStore::new()),
            cache: ResultCache::new(),
            bus: self.bus.unwrap_or_default(),
            analysis,
            streams,
            bands: self.bands,
            band_owners: Mutex::new(BandOwners::default()),
            persistence: self.persistence,
            config: self.config,
        });

        let weak = Arc::downgrade(&core);
        let routing = core
            .bus
            .subscribe(ENGINE_LISTENER, move |event: &InvalidationEvent| {
                match weak.upgrade() {
                    Some(core) => core.on_invalidation(event),
                    None => Ok(()),
                }
            });

        Ok(SignalEngine {
            core,
            routing: Some(routing),
        })
    }
}

/// Owns derived signal definitions and their cached results.
pub struct SignalEngine {
    core: Arc<EngineCore>,
    routing: Option<Subscription<InvalidationEvent>>,
}

impl Drop for SignalEngine {
    fn drop(&mut self) {
        if let Some(routing) = self.routing.take() {
            routing.unsubscribe();
        }
    }
}

impl SignalEngine {
    pub fn builder() -> SignalEngineBuilder {
        SignalEngineBuilder::default()
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.core.bus
    }

    pub fn cache(&self) -> &ResultCache {
        &self.core.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    // Definitions

    pub fn add_signal(&self, draft: SignalDraft) -> Result<SignalId> {
        let (id, graph) = {
            let mut store = self.core.store_mut();
            let id = store.add_signal(draft)?;
            (id, store.graph())
        };
        // Dangling references to this id may now resolve.
        self.core.cache.invalidate_cascade(&id, &graph);
        self.core.bus.publish(&InvalidationEvent::SignalAdded {
            signal_id: id.clone(),
        });
        self.core.sync_persistence();
        Ok(id)
    }

    /// Returns `Ok(false)` without side effects when `id` is unknown.
    pub fn update_signal(&self, id: &SignalId, update: SignalUpdate) -> Result<bool> {
        let graph = {
            let mut store = self.core.store_mut();
            if !store.update_signal(id, update)? {
                return Ok(false);
            }
            store.graph()
        };
        let affected = self.core.cache.invalidate_cascade(id, &graph);
        debug!(signal_id = %id, affected = affected.len(), "definition change invalidated");
        self.core.bus.publish(&InvalidationEvent::SignalUpdated {
            signal_id: id.clone(),
        });
        self.core.sync_persistence();
        Ok(true)
    }

    /// Remove `id`, evicting its result and invalidating its dependents.
    pub fn remove_signal(&self, id: &SignalId) -> bool {
        let dependents = {
            let mut store = self.core.store_mut();
            if store.get_signal_by_id(id).is_none() {
                return false;
            }
            let mut affected = store.graph().cascade_invalidate(id);
            store.remove_signal(id);
            affected.remove(0);
            affected
        };
        self.core.cache.evict(id);
        self.core.cache.invalidate_many(&dependents);
        debug!(signal_id = %id, dependents = dependents.len(), "signal evicted");
        self.core.bus.publish(&InvalidationEvent::SignalRemoved {
            signal_id: id.clone(),
        });
        self.core.sync_persistence();
        true
    }

    pub fn get_signal(&self, id: &SignalId) -> Option<SignalDefinition> {
        self.core.store().get_signal_by_id(id).cloned()
    }

    /// All definitions in insertion order.
    pub fn definitions(&self) -> Vec<SignalDefinition> {
        self.core.store().signals().to_vec()
    }

    pub fn get_enabled_signals(&self) -> Vec<SignalDefinition> {
        self.core
            .store()
            .get_enabled_signals()
            .into_iter()
            .cloned()
            .collect()
    }

    /// The persistable snapshot of the definition table.
    pub fn structure(&self) -> DefinitionStructure {
        DefinitionStructure::from_store(&self.core.store())
    }

    /// Replace the definition table with the persisted one, if any.
    ///
    /// Persisted definitions are not cycle-checked; the scheduler reports
    /// cycles instead.
    pub fn load_from_persistence(&self) -> Result<bool> {
        let Some(persistence) = &self.core.persistence else {
            return Ok(false);
        };
        let Some(structure) = persistence.get_structure_for_project()? else {
            return Ok(false);
        };

        let count = structure.signals.len();
        self.core.store_mut().replace_all(
            structure.signals,
            structure.created_at,
            structure.modified_at,
        );
        self.core.cache.invalidate_all();
        info!(signals = count, "definitions loaded from persistence");
        Ok(true)
    }

    // Scheduling

    pub fn get_computation_order(&self) -> std::result::Result<Vec<SignalId>, CycleError> {
        self.core.store().graph().computation_order()
    }

    // Computation

    /// Compute one signal and cache the result.
    ///
    /// The definition is re-read from the table once the computation has
    /// claimed its epoch, so an outdated copy never decides what is cached.
    /// Returns `None` if the signal is already being computed, is no longer
    /// defined, or was invalidated while this computation ran.
    pub fn compute_signal(&self, definition: &SignalDefinition) -> Option<Arc<SignalResult>> {
        let id = &definition.id;
        let Some(_guard) = self.core.cache.begin_computing(id) else {
            debug!(signal_id = %id, "already computing");
            return None;
        };
        // Epoch before definition: an edit after this read fails the commit.
        let started_epoch = self.core.cache.current_epoch(id);
        let Some(current) = self.get_signal(id) else {
            debug!(signal_id = %id, "signal removed before computation");
            return None;
        };
        if current != *definition {
            debug!(signal_id = %id, "computing the stored definition over an outdated copy");
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_pipeline(&current)));
        let result = match outcome {
            Ok(Ok(output)) => computed_result(id, output, started_epoch),
            Ok(Err(SignalError::MissingSourceData { reason })) => {
                debug!(signal_id = %id, %reason, "source data unavailable");
                SignalResult::uncomputed(id.clone(), reason, started_epoch)
            }
            Ok(Err(err)) => failed_result(id, err.to_string(), started_epoch),
            Err(panic) => failed_result(id, panic_message(panic.as_ref()), started_epoch),
        };

        let stored = self.core.cache.commit(result, started_epoch).ok()?;
        if stored.is_computed() && self.core.config.sync_on_compute {
            self.core.sync_persistence();
        }
        Some(stored)
    }

    pub fn compute_signal_by_id(&self, id: &SignalId) -> Result<Option<Arc<SignalResult>>> {
        let definition = self.require(id)?;
        Ok(self.compute_signal(&definition))
    }

    fn run_pipeline(&self, definition: &SignalDefinition) -> Result<PipelineOutput> {
        let ctx = SourceContext {
            analysis: self.core.analysis.as_ref(),
            streams: self.core.streams.as_ref(),
            cache: &self.core.cache,
            config: &self.core.config,
        };
        let series = resolve::resolve_source(&definition.source, &ctx)?;
        pipeline::post_process(
            series,
            &definition.transforms,
            definition.stabilization.as_ref(),
            &self.core.config,
        )
    }

    /// Compute every enabled signal without a valid result, dependencies
    /// first. Never fails; per-signal outcomes are in the report.
    pub fn compute_all_signals(&self) -> BatchReport {
        let (definitions, order, blocked) = {
            let store = self.core.store();
            let definitions: HashMap<SignalId, SignalDefinition> = store
                .signals()
                .iter()
                .map(|d| (d.id.clone(), d.clone()))
                .collect();
            let (order, blocked) = match store.graph().computation_order() {
                Ok(order) => (order, Vec::new()),
                Err(CycleError { ordered, cyclic }) => {
                    warn!(blocked = cyclic.len(), "dependency cycle in definitions");
                    (ordered, cyclic)
                }
            };
            (definitions, order, blocked)
        };

        let mut report = BatchReport::default();
        for id in order {
            let Some(definition) = definitions.get(&id) else {
                continue;
            };
            if !definition.enabled {
                report.disabled.push(id);
                continue;
            }
            if !self.core.cache.needs_compute(&id) {
                debug!(signal_id = %id, "cache hit");
                report.cached.push(id);
                continue;
            }

            match self.compute_signal(definition) {
                None => report.superseded.push(id),
                Some(result) => {
                    let reason = result.message.clone().unwrap_or_default();
                    match result.status {
                        SignalStatus::Computed => report.computed.push(id),
                        SignalStatus::Uncomputed => {
                            warn!(signal_id = %id, %reason, "signal unavailable");
                            report.unavailable.push(SkippedSignal {
                                signal_id: id,
                                reason,
                            })
                        }
                        SignalStatus::Error => report.failed.push(SkippedSignal {
                            signal_id: id,
                            reason,
                        }),
                    }
                }
            }
        }

        for id in blocked {
            if !definitions.get(&id).is_some_and(|d| d.enabled) {
                report.disabled.push(id);
                continue;
            }
            self.core
                .cache
                .set(&id, SignalResult::error(id.clone(), CYCLE_BLOCKED_REASON, 0));
            report.blocked.push(id);
        }

        info!(
            computed = report.computed.len(),
            cached = report.cached.len(),
            unavailable = report.unavailable.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            "batch computation finished"
        );
        report
    }

    /// Invalidate `id` and its dependents, then compute `id`.
    pub fn recompute_signal(&self, id: &SignalId) -> Result<Option<Arc<SignalResult>>> {
        let (definition, graph) = {
            let store = self.core.store();
            let definition = store
                .get_signal_by_id(id)
                .cloned()
                .ok_or_else(|| SignalError::SignalNotFound {
                    signal_id: id.clone(),
                })?;
            (definition, store.graph())
        };
        self.core.cache.invalidate_cascade(id, &graph);
        Ok(self.compute_signal(&definition))
    }

    /// Invalidate everything, then compute all enabled signals.
    pub fn recompute_all_signals(&self) -> BatchReport {
        self.core.cache.invalidate_all();
        self.compute_all_signals()
    }

    // Queries

    /// The cached result of `id`, if still valid.
    pub fn get_signal_result(&self, id: &SignalId) -> Option<Arc<SignalResult>> {
        self.core.cache.get(id)
    }

    pub fn signal_status(&self, id: &SignalId) -> SignalStatus {
        self.get_signal_result(id)
            .map_or(SignalStatus::Uncomputed, |result| result.status)
    }

    pub fn is_source_data_available(&self, audio_source_id: &str, function_id: &str) -> bool {
        self.core
            .analysis
            .get_result(audio_source_id, function_id)
            .is_some()
    }

    fn require(&self, id: &SignalId) -> Result<SignalDefinition> {
        self.get_signal(id).ok_or_else(|| SignalError::SignalNotFound {
            signal_id: id.clone(),
        })
    }
}

fn computed_result(id: &SignalId, output: PipelineOutput, epoch: u64) -> SignalResult {
    SignalResult {
        definition_id: id.clone(),
        status: SignalStatus::Computed,
        times: output.times,
        values: output.values,
        raw_values: output.raw_values,
        value_range: output.value_range,
        percentile_range: output.percentile_range,
        message: None,
        computed_at: Utc::now(),
        epoch,
    }
}

fn failed_result(id: &SignalId, reason: String, epoch: u64) -> SignalResult {
    let failure = SignalError::ComputationFailure {
        signal_id: id.clone(),
        reason: reason.clone(),
    };
    warn!(signal_id = %id, error = %failure, "signal computation failed");
    SignalResult::error(id.clone(), reason, epoch)
}
