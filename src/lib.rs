//! Sigflow - Derived Signal Computation Graph
//!
//! Sigflow computes and caches user-authored "derived signals": one
//! dimensional time series built by reducing, transforming and stabilizing
//! the output of an external audio-analysis backend.
//!
//! # Architecture
//!
//! - [`signal`]: definitions and the definition store
//! - [`graph`]: dependency graph and evaluation order
//! - [`cache`]: epoch-tagged result cache
//! - [`bus`] / [`invalidation`]: typed publish/subscribe between domains
//! - [`pipeline`]: pure numeric stages
//! - [`engine`]: the driver tying them together
//! - [`providers`] / [`state`]: collaborator seams and persistence

pub mod bus;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod invalidation;
pub mod pipeline;
pub mod providers;
pub mod signal;
pub mod state;

pub use cache::ResultCache;
pub use config::EngineConfig;
pub use engine::{BatchReport, SignalEngine, SignalEngineBuilder};
pub use error::{Result, SignalError};
pub use graph::{ComputationGraph, CycleError};
pub use invalidation::{InvalidationBus, InvalidationEvent};
pub use signal::{
    SignalDefinition, SignalDefinitionStore, SignalDraft, SignalId, SignalResult, SignalStatus,
    SignalUpdate,
};
