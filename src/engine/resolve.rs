//! Source resolution: turns a definition's source into a time series.
//!
//! Missing upstream data is reported as `MissingSourceData`, never as a
//! failure, so the driver can leave the signal uncomputed and retry later.

use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::error::{Result, SignalError};
use crate::pipeline::{events, reduce, ResolvedSeries};
use crate::providers::{AnalysisResult, AudioAnalysisProvider, EventStreamProvider};
use crate::signal::{EventsSource, OneDSource, SignalRef, SignalSource, SignalStatus, TwoDSource};

/// Collaborators available while resolving a source.
pub(crate) struct SourceContext<'a> {
    pub analysis: &'a dyn AudioAnalysisProvider,
    pub streams: &'a dyn EventStreamProvider,
    pub cache: &'a ResultCache,
    pub config: &'a EngineConfig,
}

pub(crate) fn resolve_source(
    source: &SignalSource,
    ctx: &SourceContext<'_>,
) -> Result<ResolvedSeries> {
    match source {
        SignalSource::TwoD(source) => resolve_2d(source, ctx),
        SignalSource::OneD(source) => resolve_1d(source, ctx),
        SignalSource::Events(source) => resolve_events(source, ctx),
    }
}

fn missing(reason: String) -> SignalError {
    SignalError::MissingSourceData { reason }
}

fn resolve_2d(source: &TwoDSource, ctx: &SourceContext<'_>) -> Result<ResolvedSeries> {
    let result = ctx
        .analysis
        .get_result(&source.audio_source_id, &source.function_id)
        .ok_or_else(|| {
            missing(format!(
                "'{}' has not been computed for audio source '{}'",
                source.function_id, source.audio_source_id
            ))
        })?;

    let AnalysisResult::TwoD(matrix) = result.as_ref() else {
        return Err(SignalError::SourceKindMismatch {
            expected: "2d",
            actual: result.kind_name(),
        });
    };
    matrix.validate()?;

    let bins = reduce::resolve_range(&source.range, matrix)?;
    let values = reduce::reduce_matrix(matrix, bins, source.reducer, &source.reducer_params);
    ResolvedSeries::new(matrix.times.clone(), values)
}

fn resolve_1d(source: &OneDSource, ctx: &SourceContext<'_>) -> Result<ResolvedSeries> {
    let (result, label) = match &source.signal_ref {
        SignalRef::Mir {
            audio_source_id,
            function_id,
        } => (
            ctx.analysis.get_result(audio_source_id, function_id),
            format!("'{function_id}' for audio source '{audio_source_id}'"),
        ),
        SignalRef::Band {
            band_id,
            function_id,
        } => (
            ctx.analysis.get_band_result(band_id, function_id),
            format!("'{function_id}' for band '{band_id}'"),
        ),
        SignalRef::Derived { signal_id } => {
            let upstream = ctx
                .cache
                .get(signal_id)
                .ok_or_else(|| missing(format!("derived signal '{signal_id}' has no current result")))?;
            if upstream.status != SignalStatus::Computed {
                return Err(missing(format!(
                    "derived signal '{signal_id}' is {}",
                    upstream.status
                )));
            }
            return ResolvedSeries::new(upstream.times.clone(), upstream.values.clone());
        }
    };

    let result = result.ok_or_else(|| missing(format!("{label} has not been computed")))?;
    match result.as_ref() {
        AnalysisResult::OneD(curve) => ResolvedSeries::new(curve.times.clone(), curve.values.clone()),
        other => Err(SignalError::SourceKindMismatch {
            expected: "1d",
            actual: other.kind_name(),
        }),
    }
}

fn resolve_events(source: &EventsSource, ctx: &SourceContext<'_>) -> Result<ResolvedSeries> {
    let key = source.stream_ref.stream_key(&source.audio_source_id);
    let events = ctx
        .streams
        .get_stream(&key)
        .ok_or_else(|| missing(format!("event stream '{key}' is not available")))?;

    let duration = ctx
        .analysis
        .source_duration(&source.audio_source_id)
        .unwrap_or_else(|| {
            events
                .iter()
                .map(|e| e.time + e.duration.unwrap_or(0.0))
                .fold(0.0, f64::max)
                + ctx.config.event_tail_sec
        });

    let (times, values) = events::render_events(
        &events,
        duration,
        ctx.config.event_sample_rate_hz,
        ctx.config.max_render_samples,
        source.reducer,
        &source.window,
        &source.envelope_shape,
    )?;
    ResolvedSeries::new(times, values)
}
