//! Computed signal results
//!
//! Results are a cache, never a source of truth: they are not persisted and
//! can always be rebuilt from the definitions plus upstream analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SignalId;

/// Lifecycle state of a signal's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Computed,
    Error,
    Uncomputed,
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            SignalStatus::Computed => "computed",
            SignalStatus::Error => "error",
            SignalStatus::Uncomputed => "uncomputed",
        })
    }
}

/// Minimum and maximum of the final values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

/// Robust display range of the final values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileRange {
    pub p5: f32,
    pub p95: f32,
}

/// Output of one signal computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalResult {
    /// Definition this result was computed from.
    pub definition_id: SignalId,

    pub status: SignalStatus,

    /// Sample timestamps in seconds, ascending.
    pub times: Vec<f64>,

    /// One value per timestamp.
    pub values: Vec<f32>,

    /// Values before stabilization, when stabilization ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_values: Option<Vec<f32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_range: Option<ValueRange>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile_range: Option<PercentileRange>,

    /// Failure or unavailability reason for non-computed results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub computed_at: DateTime<Utc>,

    /// Cache generation the computation started under.
    pub epoch: u64,
}

impl SignalResult {
    /// A result whose inputs are not available yet.
    pub fn uncomputed(definition_id: SignalId, reason: impl Into<String>, epoch: u64) -> Self {
        Self::empty(definition_id, SignalStatus::Uncomputed, Some(reason.into()), epoch)
    }

    /// A result whose computation failed.
    pub fn error(definition_id: SignalId, reason: impl Into<String>, epoch: u64) -> Self {
        Self::empty(definition_id, SignalStatus::Error, Some(reason.into()), epoch)
    }

    fn empty(
        definition_id: SignalId,
        status: SignalStatus,
        message: Option<String>,
        epoch: u64,
    ) -> Self {
        Self {
            definition_id,
            status,
            times: Vec::new(),
            values: Vec::new(),
            raw_values: None,
            value_range: None,
            percentile_range: None,
            message,
            computed_at: Utc::now(),
            epoch,
        }
    }

    /// Number of samples in the series.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_computed(&self) -> bool {
        self.status == SignalStatus::Computed
    }

    /// Duration covered by the series in seconds.
    pub fn duration(&self) -> f64 {
        match (self.times.first(), self.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncomputed_has_reason_and_no_samples() {
        let result = SignalResult::uncomputed(SignalId::from("a"), "no onsets", 3);
        assert_eq!(result.status, SignalStatus::Uncomputed);
        assert_eq!(result.message.as_deref(), Some("no onsets"));
        assert!(result.is_empty());
        assert_eq!(result.epoch, 3);
        assert_eq!(result.duration(), 0.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SignalStatus::Uncomputed).unwrap();
        assert_eq!(json, "\"uncomputed\"");
    }
}
