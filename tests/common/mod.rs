//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use sigflow::pipeline::{EnvelopeShape, FeatureRange, Reducer2D, TransformStep};
use sigflow::providers::{AnalysisEvent, AnalysisResult, Curve, FeatureMatrix, InMemoryAnalysis};
use sigflow::signal::{
    EventsSource, OneDSource, SignalDraft, SignalRef, SignalSource, StreamRef, TwoDSource,
};
use sigflow::{SignalEngine, SignalId};

pub const TRACK: &str = "track";
pub const MEL_FRAMES: usize = 8;

/// Analysis store with a mel matrix, an RMS curve, a band curve and one
/// authored event stream for `TRACK`.
pub fn analysis() -> Arc<InMemoryAnalysis> {
    let analysis = InMemoryAnalysis::new();

    analysis.insert_result(
        TRACK,
        "mel",
        AnalysisResult::TwoD(FeatureMatrix {
            times: (0..MEL_FRAMES).map(|i| i as f64 * 0.25).collect(),
            frames: (0..MEL_FRAMES)
                .map(|i| (0..4).map(|j| (i + j) as f32).collect())
                .collect(),
            feature_frequencies: Some(vec![100.0, 200.0, 400.0, 800.0]),
        }),
    );

    analysis.insert_result(
        TRACK,
        "rms",
        AnalysisResult::OneD(Curve {
            times: (0..=200).map(|i| i as f64 * 0.01).collect(),
            values: (0..=200).map(|i| (i as f32 * 0.1).sin().abs()).collect(),
        }),
    );

    analysis.insert_band_result(
        "low",
        "rms",
        AnalysisResult::OneD(Curve {
            times: (0..=10).map(|i| i as f64 * 0.1).collect(),
            values: (0..=10).map(|i| i as f32).collect(),
        }),
    );

    analysis.insert_stream(
        "authored-1",
        vec![
            AnalysisEvent::at(0.5),
            AnalysisEvent {
                time: 1.0,
                weight: Some(0.5),
                duration: None,
            },
            AnalysisEvent::at(1.5),
        ],
    );
    analysis.set_duration(TRACK, 2.0);

    Arc::new(analysis)
}

pub fn engine_with(analysis: Arc<InMemoryAnalysis>) -> SignalEngine {
    SignalEngine::builder()
        .analysis(analysis.clone())
        .streams(analysis)
        .build()
        .unwrap()
}

pub fn engine() -> SignalEngine {
    engine_with(analysis())
}

pub fn mel(id: &str, range: FeatureRange, reducer: Reducer2D) -> SignalDraft {
    SignalDraft::new(
        id,
        SignalSource::TwoD(TwoDSource {
            function_id: "mel".to_string(),
            audio_source_id: TRACK.to_string(),
            range,
            reducer,
            reducer_params: Default::default(),
        }),
    )
    .with_id(id)
}

pub fn mel_mean(id: &str) -> SignalDraft {
    mel(id, FeatureRange::FullSpectrum, Reducer2D::Mean)
}

pub fn rms(id: &str) -> SignalDraft {
    mir(id, "rms")
}

pub fn mir(id: &str, function_id: &str) -> SignalDraft {
    SignalDraft::new(
        id,
        SignalSource::OneD(OneDSource {
            signal_ref: SignalRef::Mir {
                audio_source_id: TRACK.to_string(),
                function_id: function_id.to_string(),
            },
        }),
    )
    .with_id(id)
}

pub fn band_curve(id: &str, band_id: &str) -> SignalDraft {
    SignalDraft::new(
        id,
        SignalSource::OneD(OneDSource {
            signal_ref: SignalRef::Band {
                band_id: band_id.to_string(),
                function_id: "rms".to_string(),
            },
        }),
    )
    .with_id(id)
}

pub fn derived(id: &str, from: &str) -> SignalDraft {
    SignalDraft::new(id, derived_source(from)).with_id(id)
}

pub fn derived_source(from: &str) -> SignalSource {
    SignalSource::OneD(OneDSource {
        signal_ref: SignalRef::Derived {
            signal_id: SignalId::from(from),
        },
    })
}

pub fn authored_impulses(id: &str) -> SignalDraft {
    SignalDraft::new(
        id,
        SignalSource::Events(EventsSource {
            audio_source_id: TRACK.to_string(),
            stream_ref: StreamRef::AuthoredEvents {
                stream_id: "authored-1".to_string(),
            },
            reducer: Default::default(),
            window: Default::default(),
            envelope_shape: EnvelopeShape::Impulse,
        }),
    )
    .with_id(id)
}

pub fn smooth(window_sec: f64) -> TransformStep {
    TransformStep::Smooth { window_sec }
}

pub fn id(name: &str) -> SignalId {
    SignalId::from(name)
}
