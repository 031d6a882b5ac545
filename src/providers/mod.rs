//! External collaborator interfaces
//!
//! The engine reads upstream data only through these traits. Analysis
//! numerics, band editing and event authoring live behind them.

mod band;
mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bus::{Callback, Subscription};
use crate::error::{Result, SignalError};

pub use band::{bridge_band_events, BandEvent, BandRegistry, FrequencyBand};
pub use memory::{AnalysisFixture, FixtureEntry, InMemoryAnalysis};

/// A scalar curve sampled on a time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub times: Vec<f64>,
    pub values: Vec<f32>,
}

/// A time × feature matrix, one row per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMatrix {
    pub times: Vec<f64>,
    pub frames: Vec<Vec<f32>>,

    /// Centre frequency in Hz of each feature index, for frequency-indexed
    /// outputs (spectrogram, mel, CQT). `None` for cepstral and other
    /// non-frequency features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_frequencies: Option<Vec<f64>>,
}

impl FeatureMatrix {
    /// Number of feature indices per frame.
    pub fn width(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Check that frames and timestamps line up and rows are rectangular.
    pub fn validate(&self) -> Result<()> {
        if self.frames.len() != self.times.len() {
            return Err(SignalError::ShapeMismatch {
                times: self.times.len(),
                values: self.frames.len(),
            });
        }
        let width = self.width();
        if self.frames.iter().any(|frame| frame.len() != width) {
            return Err(SignalError::InvalidParameter {
                param: "frames".to_string(),
                value: "ragged rows".to_string(),
                expected: format!("{width} features per frame"),
            });
        }
        Ok(())
    }
}

/// One discrete event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    /// Event time in seconds.
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
    /// Sustain in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl AnalysisEvent {
    pub fn at(time: f64) -> Self {
        Self {
            time,
            weight: None,
            duration: None,
        }
    }

    pub fn weight_or_unit(&self) -> f32 {
        self.weight.unwrap_or(1.0)
    }
}

/// Output of one analysis function for one audio source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AnalysisResult {
    #[serde(rename = "1d")]
    OneD(Curve),
    #[serde(rename = "2d")]
    TwoD(FeatureMatrix),
    #[serde(rename = "events")]
    Events { events: Vec<AnalysisEvent> },
}

impl AnalysisResult {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AnalysisResult::OneD(_) => "1d",
            AnalysisResult::TwoD(_) => "2d",
            AnalysisResult::Events { .. } => "events",
        }
    }
}

/// Cached outputs of the analysis backend.
pub trait AudioAnalysisProvider: Send + Sync {
    /// Result of `function_id` for `audio_source_id`, if it has been computed.
    fn get_result(&self, audio_source_id: &str, function_id: &str) -> Option<Arc<AnalysisResult>>;

    /// Result of `function_id` restricted to a frequency band.
    fn get_band_result(&self, _band_id: &str, _function_id: &str) -> Option<Arc<AnalysisResult>> {
        None
    }

    /// Length of the audio source in seconds.
    fn source_duration(&self, _audio_source_id: &str) -> Option<f64> {
        None
    }
}

/// Authored and candidate event streams.
pub trait EventStreamProvider: Send + Sync {
    fn get_stream(&self, stream_id: &str) -> Option<Vec<AnalysisEvent>>;
}

/// Frequency band definitions owned by another domain.
pub trait BandDefinitionProvider: Send + Sync {
    fn subscribe(&self, listener_id: &str, callback: Callback<BandEvent>)
        -> Subscription<BandEvent>;

    fn get_bands_for_source(&self, source_id: &str) -> Vec<FrequencyBand>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_result_json_tags() {
        let json = r#"{"kind": "1d", "times": [0.0, 0.5], "values": [1.0, 2.0]}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.kind_name(), "1d");

        let json = r#"{"kind": "events", "events": [{"time": 1.5, "weight": 0.5}]}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        match result {
            AnalysisResult::Events { events } => {
                assert_eq!(events[0].weight_or_unit(), 0.5);
                assert_eq!(events[0].duration, None);
            }
            other => panic!("unexpected kind {}", other.kind_name()),
        }
    }

    #[test]
    fn test_ragged_matrix_rejected() {
        let matrix = FeatureMatrix {
            times: vec![0.0, 0.1],
            frames: vec![vec![1.0, 2.0], vec![1.0]],
            feature_frequencies: None,
        };
        assert!(matrix.validate().is_err());
    }
}
