//! Signal Engine Module
//!
//! Orchestrates definitions, scheduling, caching and the transform pipeline:
//! - Source resolution for 2D, 1D and event sources
//! - Upstream event routing
//! - Single, batch and forced computation

mod driver;
mod report;
mod resolve;
mod routing;

pub use driver::{SignalEngine, SignalEngineBuilder, ENGINE_LISTENER};
pub use report::{BatchReport, SkippedSignal};
