//! In-memory analysis and event stream store
//!
//! Backs the CLI (loaded from a JSON fixture) and the test suites.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::{AnalysisEvent, AnalysisResult, AudioAnalysisProvider, EventStreamProvider};
use super::band::FrequencyBand;
use crate::error::{Result, SignalError};

/// One stored analysis output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureEntry {
    /// Audio source id, or band id for band-scoped entries.
    pub owner_id: String,
    pub function_id: String,
    pub result: AnalysisResult,
}

/// JSON document describing cached analysis for offline computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisFixture {
    pub results: Vec<FixtureEntry>,
    pub band_results: Vec<FixtureEntry>,
    pub streams: HashMap<String, Vec<AnalysisEvent>>,
    pub durations: HashMap<String, f64>,
    pub bands: Vec<FrequencyBand>,
}

impl AnalysisFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SignalError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

type Key = (String, String);

#[derive(Default)]
struct AnalysisTables {
    results: HashMap<Key, Arc<AnalysisResult>>,
    band_results: HashMap<Key, Arc<AnalysisResult>>,
    streams: HashMap<String, Vec<AnalysisEvent>>,
    durations: HashMap<String, f64>,
}

/// Analysis results and event streams held in memory.
#[derive(Default)]
pub struct InMemoryAnalysis {
    tables: RwLock<AnalysisTables>,
}

impl InMemoryAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: AnalysisFixture) -> Self {
        let store = Self::new();
        for entry in fixture.results {
            store.insert_result(&entry.owner_id, &entry.function_id, entry.result);
        }
        for entry in fixture.band_results {
            store.insert_band_result(&entry.owner_id, &entry.function_id, entry.result);
        }
        for (stream_id, events) in fixture.streams {
            store.insert_stream(&stream_id, events);
        }
        for (source_id, duration) in fixture.durations {
            store.set_duration(&source_id, duration);
        }
        store
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AnalysisTables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AnalysisTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_result(&self, audio_source_id: &str, function_id: &str, result: AnalysisResult) {
        self.write().results.insert(
            (audio_source_id.to_string(), function_id.to_string()),
            Arc::new(result),
        );
    }

    pub fn remove_result(&self, audio_source_id: &str, function_id: &str) {
        self.write()
            .results
            .remove(&(audio_source_id.to_string(), function_id.to_string()));
    }

    pub fn insert_band_result(&self, band_id: &str, function_id: &str, result: AnalysisResult) {
        self.write().band_results.insert(
            (band_id.to_string(), function_id.to_string()),
            Arc::new(result),
        );
    }

    pub fn insert_stream(&self, stream_id: &str, mut events: Vec<AnalysisEvent>) {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.write().streams.insert(stream_id.to_string(), events);
    }

    pub fn set_duration(&self, audio_source_id: &str, duration: f64) {
        self.write()
            .durations
            .insert(audio_source_id.to_string(), duration);
    }
}

impl AudioAnalysisProvider for InMemoryAnalysis {
    fn get_result(&self, audio_source_id: &str, function_id: &str) -> Option<Arc<AnalysisResult>> {
        self.read()
            .results
            .get(&(audio_source_id.to_string(), function_id.to_string()))
            .cloned()
    }

    fn get_band_result(&self, band_id: &str, function_id: &str) -> Option<Arc<AnalysisResult>> {
        self.read()
            .band_results
            .get(&(band_id.to_string(), function_id.to_string()))
            .cloned()
    }

    fn source_duration(&self, audio_source_id: &str) -> Option<f64> {
        self.read().durations.get(audio_source_id).copied()
    }
}

impl EventStreamProvider for InMemoryAnalysis {
    fn get_stream(&self, stream_id: &str) -> Option<Vec<AnalysisEvent>> {
        self.read().streams.get(stream_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Curve;

    #[test]
    fn test_fixture_round_trip_into_store() {
        let json = r#"{
            "results": [
                {"ownerId": "track", "functionId": "rms",
                 "result": {"kind": "1d", "times": [0.0, 1.0], "values": [0.1, 0.2]}}
            ],
            "streams": {"candidateOnsets:track": [{"time": 2.0}, {"time": 1.0}]},
            "durations": {"track": 3.0}
        }"#;
        let fixture: AnalysisFixture = serde_json::from_str(json).unwrap();
        let store = InMemoryAnalysis::from_fixture(fixture);

        let result = store.get_result("track", "rms").unwrap();
        assert_eq!(
            *result,
            AnalysisResult::OneD(Curve {
                times: vec![0.0, 1.0],
                values: vec![0.1, 0.2],
            })
        );
        assert_eq!(store.source_duration("track"), Some(3.0));

        let stream = store.get_stream("candidateOnsets:track").unwrap();
        assert_eq!(stream[0].time, 1.0);
        assert!(store.get_band_result("low", "rms").is_none());
    }
}
