//! Engine configuration
//!
//! All fields have defaults so a partial JSON document (or none at all) is a
//! valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Default sample rate for rendering discrete event streams.
pub const DEFAULT_EVENT_SAMPLE_RATE_HZ: f64 = 100.0;

/// Default cap on rendered event samples (about 27 hours at 100 Hz).
pub const DEFAULT_MAX_RENDER_SAMPLES: usize = 10_000_000;

/// Tunables for the computation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Fixed rate at which event streams are rendered into dense signals.
    pub event_sample_rate_hz: f64,

    /// Lower percentile reported in `percentileRange` (0-100).
    pub percentile_low: f64,

    /// Upper percentile reported in `percentileRange` (0-100).
    pub percentile_high: f64,

    /// Sample rate assumed when a time axis has fewer than two samples.
    pub fallback_sample_rate_hz: f64,

    /// Padding after the last event when the source duration is unknown.
    pub event_tail_sec: f64,

    /// Largest number of samples an event stream may render to.
    pub max_render_samples: usize,

    /// Push the definition set to the persistence collaborator after each
    /// successful computation.
    pub sync_on_compute: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_sample_rate_hz: DEFAULT_EVENT_SAMPLE_RATE_HZ,
            percentile_low: 5.0,
            percentile_high: 95.0,
            fallback_sample_rate_hz: 1.0,
            event_tail_sec: 1.0,
            max_render_samples: DEFAULT_MAX_RENDER_SAMPLES,
            sync_on_compute: true,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SignalError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.event_sample_rate_hz.is_finite() && self.event_sample_rate_hz > 0.0) {
            return Err(SignalError::InvalidParameter {
                param: "eventSampleRateHz".to_string(),
                value: self.event_sample_rate_hz.to_string(),
                expected: "a positive rate".to_string(),
            });
        }
        if !(self.fallback_sample_rate_hz.is_finite() && self.fallback_sample_rate_hz > 0.0) {
            return Err(SignalError::InvalidParameter {
                param: "fallbackSampleRateHz".to_string(),
                value: self.fallback_sample_rate_hz.to_string(),
                expected: "a positive rate".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.percentile_low)
            || !(0.0..=100.0).contains(&self.percentile_high)
            || self.percentile_low > self.percentile_high
        {
            return Err(SignalError::InvalidParameter {
                param: "percentileLow/percentileHigh".to_string(),
                value: format!("{}/{}", self.percentile_low, self.percentile_high),
                expected: "0 <= low <= high <= 100".to_string(),
            });
        }
        if self.event_tail_sec < 0.0 {
            return Err(SignalError::InvalidParameter {
                param: "eventTailSec".to_string(),
                value: self.event_tail_sec.to_string(),
                expected: ">= 0 seconds".to_string(),
            });
        }
        if self.max_render_samples == 0 {
            return Err(SignalError::InvalidParameter {
                param: "maxRenderSamples".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"eventSampleRateHz": 200.0}"#).unwrap();
        assert_eq!(config.event_sample_rate_hz, 200.0);
        assert_eq!(config.percentile_high, 95.0);
        assert!(config.sync_on_compute);
    }

    #[test]
    fn test_inverted_percentiles_rejected() {
        let config = EngineConfig {
            percentile_low: 90.0,
            percentile_high: 10.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SignalError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_zero_render_cap_rejected() {
        let config: EngineConfig = serde_json::from_str(r#"{"maxRenderSamples": 0}"#).unwrap();
        assert!(config.validate().is_err());
        assert_eq!(
            EngineConfig::default().max_render_samples,
            DEFAULT_MAX_RENDER_SAMPLES
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"syncOnCompute": false}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert!(!config.sync_on_compute);
        assert_eq!(config.event_sample_rate_hz, DEFAULT_EVENT_SAMPLE_RATE_HZ);
    }
}
