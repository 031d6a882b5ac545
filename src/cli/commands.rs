//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::{BatchReport, SignalEngine};
use crate::error::{Result, SignalError};
use crate::providers::{bridge_band_events, AnalysisFixture, BandRegistry, InMemoryAnalysis};
use crate::signal::{SignalResult, SignalStatus};
use crate::state::{DefinitionStructure, InMemoryPersistence, JsonFilePersistence};

fn load_structure(definitions: &Path) -> Result<DefinitionStructure> {
    Ok(JsonFilePersistence::new(definitions).inspect()?.structure)
}

/// Compute all enabled signals from a definitions file and an analysis fixture.
pub fn compute(definitions: &Path, analysis: &Path, config: Option<&Path>) -> Result<BatchReport> {
    info!("Computing signals from: {}", definitions.display());

    let config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let structure = load_structure(definitions)?;
    let fixture = AnalysisFixture::load(analysis)?;
    let bands = fixture.bands.clone();
    let store = Arc::new(InMemoryAnalysis::from_fixture(fixture));

    let registry = Arc::new(BandRegistry::new());

    // Read-only: the CLI never rewrites the definitions file.
    let engine = SignalEngine::builder()
        .analysis(store.clone())
        .streams(store)
        .bands(registry.clone())
        .persistence(Arc::new(InMemoryPersistence::read_only(structure)))
        .config(config)
        .build()?;
    engine.load_from_persistence()?;

    let bridge = bridge_band_events(registry.as_ref(), engine.bus());
    for band in bands {
        registry.add_band(band);
    }
    bridge.unsubscribe();

    let report = engine.compute_all_signals();
    for definition in engine.definitions() {
        let line = match engine.get_signal_result(&definition.id) {
            Some(result) => describe(&result),
            None if !definition.enabled => "disabled".to_string(),
            None => "uncomputed".to_string(),
        };
        println!("{:<28} {}", definition.id, line);
    }
    println!(
        "{} computed, {} unavailable, {} failed, {} blocked",
        report.computed.len(),
        report.unavailable.len(),
        report.failed.len(),
        report.blocked.len()
    );

    Ok(report)
}

fn describe(result: &SignalResult) -> String {
    match result.status {
        SignalStatus::Computed => {
            let mut line = format!("computed   {} samples", result.len());
            if let Some(range) = result.value_range {
                line.push_str(&format!("  min/max {:.4}..{:.4}", range.min, range.max));
            }
            if let Some(range) = result.percentile_range {
                line.push_str(&format!("  p5/p95 {:.4}..{:.4}", range.p5, range.p95));
            }
            line
        }
        status => format!(
            "{:<10} {}",
            status,
            result.message.as_deref().unwrap_or_default()
        ),
    }
}

/// Print the evaluation order, or what a cycle blocks.
pub fn order(definitions: &Path) -> Result<()> {
    let store = load_structure(definitions)?.into_store();
    let graph = store.graph();

    match graph.computation_order() {
        Ok(order) => {
            for (position, id) in order.iter().enumerate() {
                println!("{:>3}. {}", position + 1, id);
            }
            Ok(())
        }
        Err(cycle) => {
            for (position, id) in cycle.ordered.iter().enumerate() {
                println!("{:>3}. {}", position + 1, id);
            }
            for id in &cycle.cyclic {
                println!("  -  {} (blocked)", id);
            }
            let first = graph
                .nodes_on_cycles()
                .into_iter()
                .next()
                .or_else(|| cycle.cyclic.first().cloned());
            match first {
                Some(signal_id) => Err(SignalError::CyclicDependency {
                    cycle: graph.cycle_through(&signal_id).unwrap_or_default(),
                    signal_id,
                }),
                None => Ok(()),
            }
        }
    }
}

/// Validate a definitions file without computing anything.
pub fn validate(definitions: &Path) -> Result<()> {
    let report = JsonFilePersistence::new(definitions).inspect()?;
    println!("Stored version: {}", report.stored_version);
    match report.checksum_verified {
        Some(true) => println!("Checksum: ok"),
        Some(false) => println!("Checksum: mismatch"),
        None => println!("Checksum: none (bare structure)"),
    }

    let mut problems = 0;
    for definition in &report.structure.signals {
        if let Err(err) = definition.validate() {
            warn!(signal_id = %definition.id, error = %err, "invalid definition");
            println!("{}: {}", definition.id, err);
            problems += 1;
        }
    }

    let graph = report.structure.clone().into_store().graph();
    for id in graph.nodes_on_cycles() {
        if let Some(cycle) = graph.cycle_through(&id) {
            let err = SignalError::CyclicDependency {
                signal_id: id.clone(),
                cycle,
            };
            println!("{}: {}", id, err);
            problems += 1;
        }
    }

    println!(
        "{} signal(s), {} problem(s)",
        report.structure.signals.len(),
        problems
    );
    if problems > 0 {
        return Err(SignalError::InvalidDefinition {
            reason: format!("{problems} problem(s) in {}", definitions.display()),
        });
    }
    Ok(())
}
