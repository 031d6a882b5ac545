//! Maps upstream invalidation events to the signals they touch.

use std::collections::HashMap;

use crate::invalidation::InvalidationEvent;
use crate::providers::FrequencyBand;
use crate::signal::{SignalDefinition, SignalId};

/// Audio source each band belongs to, as far as the engine has seen.
///
/// Learned from band events and from the band provider. A band the engine
/// has never seen counts as belonging to every source.
#[derive(Debug, Default)]
pub(crate) struct BandOwners {
    owners: HashMap<String, String>,
}

impl BandOwners {
    pub(crate) fn belongs_to(&self, band_id: &str, source_id: &str) -> bool {
        self.owners
            .get(band_id)
            .map_or(true, |owner| owner == source_id)
    }

    /// Record bands listed by the band provider.
    pub(crate) fn learn(&mut self, bands: &[FrequencyBand]) {
        for band in bands {
            self.owners.insert(band.id.clone(), band.source_id.clone());
        }
    }

    /// Apply the ownership change `event` describes. Called after routing,
    /// so a cleared source still owns its bands while the event is routed.
    pub(crate) fn observe(&mut self, event: &InvalidationEvent, listed: &[FrequencyBand]) {
        match event {
            InvalidationEvent::BandAdded { source_id, band_id }
            | InvalidationEvent::BandUpdated { source_id, band_id }
            | InvalidationEvent::BandEnabledChanged {
                source_id, band_id, ..
            } => {
                self.owners.insert(band_id.clone(), source_id.clone());
            }
            InvalidationEvent::BandRemoved { band_id, .. } => {
                self.owners.remove(band_id);
            }
            InvalidationEvent::StructureCleared { source_id }
            | InvalidationEvent::StructureImported { source_id } => {
                self.owners.retain(|_, owner| owner != source_id);
                self.learn(listed);
            }
            _ => {}
        }
    }
}

/// Signals directly affected by `event`, before cascading to dependents.
///
/// Definition events yield nothing: the engine invalidates for its own
/// mutations before publishing them.
pub(crate) fn affected_signals(
    signals: &[SignalDefinition],
    event: &InvalidationEvent,
    bands: &BandOwners,
) -> Vec<SignalId> {
    match event {
        InvalidationEvent::SignalAdded { .. }
        | InvalidationEvent::SignalUpdated { .. }
        | InvalidationEvent::SignalRemoved { .. } => Vec::new(),
        InvalidationEvent::BandAdded { band_id, .. }
        | InvalidationEvent::BandUpdated { band_id, .. }
        | InvalidationEvent::BandRemoved { band_id, .. }
        | InvalidationEvent::BandEnabledChanged { band_id, .. } => {
            select(signals, |s| s.source.band_id() == Some(band_id.as_str()))
        }
        InvalidationEvent::StructureCleared { source_id }
        | InvalidationEvent::StructureImported { source_id } => select(signals, |s| {
            s.source
                .band_id()
                .is_some_and(|band| bands.belongs_to(band, source_id))
        }),
        InvalidationEvent::AudioSourceChanged { audio_source_id } => select(signals, |s| {
            s.source.audio_source_id() == Some(audio_source_id.as_str())
                || s.source
                    .band_id()
                    .is_some_and(|band| bands.belongs_to(band, audio_source_id))
        }),
    }
}

fn select(
    signals: &[SignalDefinition],
    predicate: impl Fn(&SignalDefinition) -> bool,
) -> Vec<SignalId> {
    signals
        .iter()
        .filter(|s| predicate(s))
        .map(|s| s.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{EnvelopeShape, FeatureRange, Reducer2D};
    use crate::signal::{
        EventsSource, OneDSource, SignalDraft, SignalRef, SignalSource, StreamRef, TwoDSource,
    };
    use chrono::Utc;

    fn definition(id: &str, source: SignalSource) -> SignalDefinition {
        SignalDraft::new(id, source)
            .with_id(id)
            .into_definition(Utc::now())
    }

    fn fixture() -> Vec<SignalDefinition> {
        vec![
            definition(
                "spectral",
                SignalSource::TwoD(TwoDSource {
                    function_id: "mel".to_string(),
                    audio_source_id: "track".to_string(),
                    range: FeatureRange::FullSpectrum,
                    reducer: Reducer2D::Mean,
                    reducer_params: Default::default(),
                }),
            ),
            definition(
                "band-curve",
                SignalSource::OneD(OneDSource {
                    signal_ref: SignalRef::Band {
                        band_id: "low".to_string(),
                        function_id: "rms".to_string(),
                    },
                }),
            ),
            definition(
                "band-onsets",
                SignalSource::Events(EventsSource {
                    audio_source_id: "other".to_string(),
                    stream_ref: StreamRef::BandOnsetPeaks {
                        band_id: "high".to_string(),
                    },
                    reducer: Default::default(),
                    window: Default::default(),
                    envelope_shape: EnvelopeShape::Impulse,
                }),
            ),
            definition(
                "derived",
                SignalSource::OneD(OneDSource {
                    signal_ref: SignalRef::Derived {
                        signal_id: SignalId::from("spectral"),
                    },
                }),
            ),
        ]
    }

    fn names(ids: Vec<SignalId>) -> Vec<String> {
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    fn owners(pairs: &[(&str, &str)]) -> BandOwners {
        let mut owners = BandOwners::default();
        for (band_id, source_id) in pairs {
            owners
                .owners
                .insert(band_id.to_string(), source_id.to_string());
        }
        owners
    }

    fn band(id: &str, source_id: &str) -> FrequencyBand {
        FrequencyBand {
            id: id.to_string(),
            source_id: source_id.to_string(),
            label: id.to_string(),
            low_hz: 20.0,
            high_hz: 200.0,
            enabled: true,
        }
    }

    #[test]
    fn test_band_events_hit_band_references() {
        let signals = fixture();
        let known = owners(&[("low", "track"), ("high", "other")]);
        let event = InvalidationEvent::BandUpdated {
            source_id: "track".to_string(),
            band_id: "low".to_string(),
        };
        assert_eq!(names(affected_signals(&signals, &event, &known)), vec!["band-curve"]);

        let event = InvalidationEvent::BandEnabledChanged {
            source_id: "other".to_string(),
            band_id: "high".to_string(),
            enabled: false,
        };
        assert_eq!(names(affected_signals(&signals, &event, &known)), vec!["band-onsets"]);
    }

    #[test]
    fn test_band_added_leaves_source_signals_alone() {
        let signals = fixture();
        let event = InvalidationEvent::BandAdded {
            source_id: "track".to_string(),
            band_id: "low".to_string(),
        };
        let affected = names(affected_signals(&signals, &event, &BandOwners::default()));
        assert_eq!(affected, vec!["band-curve"]);

        let event = InvalidationEvent::BandAdded {
            source_id: "track".to_string(),
            band_id: "mid".to_string(),
        };
        assert!(affected_signals(&signals, &event, &BandOwners::default()).is_empty());
    }

    #[test]
    fn test_audio_source_change_hits_bound_signals() {
        let signals = fixture();
        let event = InvalidationEvent::AudioSourceChanged {
            audio_source_id: "track".to_string(),
        };
        // `derived` is reached by the cascade, not directly.
        let known = owners(&[("low", "track"), ("high", "other")]);
        assert_eq!(
            names(affected_signals(&signals, &event, &known)),
            vec!["spectral", "band-curve"]
        );

        let elsewhere = owners(&[("low", "other"), ("high", "other")]);
        assert_eq!(
            names(affected_signals(&signals, &event, &elsewhere)),
            vec!["spectral"]
        );
    }

    #[test]
    fn test_unknown_bands_belong_to_every_source() {
        let signals = fixture();
        let event = InvalidationEvent::AudioSourceChanged {
            audio_source_id: "track".to_string(),
        };
        assert_eq!(
            names(affected_signals(&signals, &event, &BandOwners::default())),
            vec!["spectral", "band-curve", "band-onsets"]
        );
    }

    #[test]
    fn test_structure_events_are_scoped_to_their_source() {
        let signals = fixture();
        let known = owners(&[("low", "track"), ("high", "other")]);
        let event = InvalidationEvent::StructureCleared {
            source_id: "track".to_string(),
        };
        assert_eq!(names(affected_signals(&signals, &event, &known)), vec!["band-curve"]);

        let event = InvalidationEvent::StructureImported {
            source_id: "other".to_string(),
        };
        assert_eq!(names(affected_signals(&signals, &event, &known)), vec!["band-onsets"]);
    }

    #[test]
    fn test_observe_tracks_ownership_changes() {
        let mut known = owners(&[("low", "track"), ("high", "other")]);
        known.observe(
            &InvalidationEvent::StructureCleared {
                source_id: "track".to_string(),
            },
            &[],
        );
        assert!(known.belongs_to("low", "other"));
        assert!(!known.belongs_to("high", "track"));

        known.observe(
            &InvalidationEvent::StructureImported {
                source_id: "other".to_string(),
            },
            &[band("mid", "other")],
        );
        assert!(!known.belongs_to("mid", "track"));
        assert!(known.belongs_to("high", "track"));

        known.observe(
            &InvalidationEvent::BandAdded {
                source_id: "track".to_string(),
                band_id: "low".to_string(),
            },
            &[],
        );
        assert!(!known.belongs_to("low", "other"));
    }

    #[test]
    fn test_definition_events_are_ignored() {
        let signals = fixture();
        let event = InvalidationEvent::SignalUpdated {
            signal_id: SignalId::from("spectral"),
        };
        assert!(affected_signals(&signals, &event, &BandOwners::default()).is_empty());
    }
}
