//! Signal definition schema
//!
//! Definitions are the only derived-signal state that is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SignalId;
use crate::error::{Result, SignalError};
use crate::pipeline::{
    EnvelopeShape, EventReducer, EventWindow, FeatureRange, PolarityMode, Reducer2D,
    ReducerParams, StabilizationConfig, TransformStep,
};

/// Where a signal's input values come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SignalSource {
    #[serde(rename = "2d")]
    TwoD(TwoDSource),
    #[serde(rename = "1d")]
    OneD(OneDSource),
    #[serde(rename = "events")]
    Events(EventsSource),
}

/// A time × feature matrix reduced to one value per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoDSource {
    pub function_id: String,
    pub audio_source_id: String,
    pub range: FeatureRange,
    pub reducer: Reducer2D,
    #[serde(default)]
    pub reducer_params: ReducerParams,
}

/// A scalar curve used as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneDSource {
    pub signal_ref: SignalRef,
}

/// Reference to an existing scalar curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SignalRef {
    /// Analysis backend output for an audio source.
    Mir {
        audio_source_id: String,
        function_id: String,
    },
    /// Band-scoped analysis output.
    Band { band_id: String, function_id: String },
    /// Result of another derived signal.
    Derived { signal_id: SignalId },
}

/// A discrete event stream rendered to a dense signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsSource {
    pub audio_source_id: String,
    pub stream_ref: StreamRef,
    #[serde(default)]
    pub reducer: EventReducer,
    #[serde(default)]
    pub window: EventWindow,
    pub envelope_shape: EnvelopeShape,
}

/// Named event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StreamRef {
    CandidateOnsets,
    CandidateBeats,
    AuthoredEvents { stream_id: String },
    BandOnsetPeaks { band_id: String },
    BandBeatCandidates { band_id: String },
}

impl StreamRef {
    /// Key under which the stream provider stores this stream.
    pub fn stream_key(&self, audio_source_id: &str) -> String {
        match self {
            StreamRef::CandidateOnsets => format!("candidateOnsets:{audio_source_id}"),
            StreamRef::CandidateBeats => format!("candidateBeats:{audio_source_id}"),
            StreamRef::AuthoredEvents { stream_id } => stream_id.clone(),
            StreamRef::BandOnsetPeaks { band_id } => format!("bandOnsetPeaks:{band_id}"),
            StreamRef::BandBeatCandidates { band_id } => format!("bandBeatCandidates:{band_id}"),
        }
    }

    pub fn band_id(&self) -> Option<&str> {
        match self {
            StreamRef::BandOnsetPeaks { band_id } | StreamRef::BandBeatCandidates { band_id } => {
                Some(band_id)
            }
            _ => None,
        }
    }
}

impl SignalSource {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SignalSource::TwoD(_) => "2d",
            SignalSource::OneD(_) => "1d",
            SignalSource::Events(_) => "events",
        }
    }

    /// The derived signal this source reads, if any.
    pub fn derived_dependency(&self) -> Option<&SignalId> {
        match self {
            SignalSource::OneD(OneDSource {
                signal_ref: SignalRef::Derived { signal_id },
            }) => Some(signal_id),
            _ => None,
        }
    }

    /// Audio source the inputs are computed from, if bound directly.
    pub fn audio_source_id(&self) -> Option<&str> {
        match self {
            SignalSource::TwoD(source) => Some(&source.audio_source_id),
            SignalSource::OneD(OneDSource {
                signal_ref: SignalRef::Mir {
                    audio_source_id, ..
                },
            }) => Some(audio_source_id),
            SignalSource::Events(source) => Some(&source.audio_source_id),
            SignalSource::OneD(_) => None,
        }
    }

    /// Band the inputs depend on, if any.
    pub fn band_id(&self) -> Option<&str> {
        match self {
            SignalSource::TwoD(TwoDSource {
                range: FeatureRange::BandReference { band_id },
                ..
            }) => Some(band_id),
            SignalSource::OneD(OneDSource {
                signal_ref: SignalRef::Band { band_id, .. },
            }) => Some(band_id),
            SignalSource::Events(source) => source.stream_ref.band_id(),
            _ => None,
        }
    }

    /// Validate parameters that do not depend on upstream data.
    pub fn validate(&self) -> Result<()> {
        match self {
            SignalSource::TwoD(source) => {
                if source.function_id.is_empty() || source.audio_source_id.is_empty() {
                    return Err(SignalError::InvalidDefinition {
                        reason: "2D source needs a function id and an audio source id".to_string(),
                    });
                }
                Ok(())
            }
            SignalSource::OneD(_) => Ok(()),
            SignalSource::Events(source) => source.envelope_shape.validate(),
        }
    }
}

/// A user-authored derived signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDefinition {
    pub id: SignalId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub source: SignalSource,
    #[serde(default)]
    pub transforms: Vec<TransformStep>,
    /// `None` disables stabilization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stabilization: Option<StabilizationConfig>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl SignalDefinition {
    /// Derived signals this definition reads.
    pub fn dependencies(&self) -> Vec<SignalId> {
        self.source.derived_dependency().cloned().into_iter().collect()
    }

    pub fn polarity(&self) -> PolarityMode {
        crate::pipeline::transform::polarity_of(&self.transforms)
    }

    /// Validate everything checkable without upstream data.
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        for step in &self.transforms {
            step.validate()?;
        }
        if let Some(stabilization) = &self.stabilization {
            stabilization.validate()?;
        }
        Ok(())
    }
}

/// Fields for a new definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDraft {
    /// Explicit id, for imports that must keep stable references.
    pub id: Option<SignalId>,
    pub name: String,
    pub enabled: bool,
    pub source: SignalSource,
    pub transforms: Vec<TransformStep>,
    pub stabilization: Option<StabilizationConfig>,
}

impl SignalDraft {
    pub fn new(name: impl Into<String>, source: SignalSource) -> Self {
        Self {
            id: None,
            name: name.into(),
            enabled: true,
            source,
            transforms: Vec::new(),
            stabilization: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<SignalId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_transforms(mut self, transforms: Vec<TransformStep>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_stabilization(mut self, stabilization: StabilizationConfig) -> Self {
        self.stabilization = Some(stabilization);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Build the definition, stamping both timestamps with `now`.
    pub fn into_definition(self, now: DateTime<Utc>) -> SignalDefinition {
        SignalDefinition {
            id: self.id.unwrap_or_else(SignalId::generate),
            name: self.name,
            enabled: self.enabled,
            source: self.source,
            transforms: self.transforms,
            stabilization: self.stabilization,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub source: Option<SignalSource>,
    pub transforms: Option<Vec<TransformStep>>,
    /// `Some(None)` disables stabilization.
    pub stabilization: Option<Option<StabilizationConfig>>,
}

impl SignalUpdate {
    pub fn is_empty(&self) -> bool {
        self == &SignalUpdate::default()
    }

    /// Apply to `definition`, bumping `modified_at`.
    pub fn apply_to(self, definition: &mut SignalDefinition, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            definition.name = name;
        }
        if let Some(enabled) = self.enabled {
            definition.enabled = enabled;
        }
        if let Some(source) = self.source {
            definition.source = source;
        }
        if let Some(transforms) = self.transforms {
            definition.transforms = transforms;
        }
        if let Some(stabilization) = self.stabilization {
            definition.stabilization = stabilization;
        }
        definition.modified_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_json_shape() {
        let json = r#"{
            "id": "kick",
            "name": "Kick energy",
            "source": {
                "kind": "2d",
                "functionId": "melSpectrogram",
                "audioSourceId": "track",
                "range": {"kind": "frequencyRange", "lowHz": 20.0, "highHz": 150.0},
                "reducer": "mean"
            },
            "transforms": [{"kind": "polarity", "mode": "positive"}],
            "createdAt": "2026-01-01T00:00:00Z",
            "modifiedAt": "2026-01-01T00:00:00Z"
        }"#;
        let definition: SignalDefinition = serde_json::from_str(json).unwrap();
        assert!(definition.enabled);
        assert_eq!(definition.polarity(), PolarityMode::Positive);
        assert_eq!(definition.source.audio_source_id(), Some("track"));
        assert!(definition.dependencies().is_empty());
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_derived_dependency() {
        let source: SignalSource = serde_json::from_str(
            r#"{"kind": "1d", "signalRef": {"kind": "derived", "signalId": "upstream"}}"#,
        )
        .unwrap();
        assert_eq!(source.derived_dependency(), Some(&SignalId::from("upstream")));
        assert_eq!(source.audio_source_id(), None);
    }

    #[test]
    fn test_stream_keys() {
        assert_eq!(
            StreamRef::CandidateOnsets.stream_key("track"),
            "candidateOnsets:track"
        );
        let band = StreamRef::BandOnsetPeaks {
            band_id: "low".to_string(),
        };
        assert_eq!(band.stream_key("track"), "bandOnsetPeaks:low");
        assert_eq!(band.band_id(), Some("low"));
    }

    #[test]
    fn test_update_bumps_modified_at() {
        let created = Utc::now() - chrono::Duration::seconds(10);
        let mut definition = SignalDraft::new(
            "a",
            SignalSource::OneD(OneDSource {
                signal_ref: SignalRef::Mir {
                    audio_source_id: "track".to_string(),
                    function_id: "rms".to_string(),
                },
            }),
        )
        .into_definition(created);

        let update = SignalUpdate {
            name: Some("renamed".to_string()),
            stabilization: Some(None),
            ..SignalUpdate::default()
        };
        assert!(!update.is_empty());
        update.apply_to(&mut definition, Utc::now());
        assert_eq!(definition.name, "renamed");
        assert!(definition.modified_at > definition.created_at);
    }
}
