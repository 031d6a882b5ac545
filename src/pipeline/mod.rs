//! Transform pipeline
//!
//! Pure numeric stages. Source resolution produces a [`ResolvedSeries`]; the
//! shared post-processing then runs, in order:
//!
//! 1. sample-rate inference from the time axis
//! 2. the transform chain
//! 3. polarity
//! 4. stabilization (keeping the pre-stabilization values)
//! 5. min/max and percentile statistics

pub mod events;
pub mod reduce;
pub mod stabilize;
pub mod stats;
pub mod transform;

pub use events::{EnvelopeShape, EventReducer, EventWindow, WindowKind};
pub use reduce::{FeatureRange, Reducer2D, ReducerParams};
pub use stabilize::{EnvelopeFollower, EnvelopeMode, StabilizationConfig, StabilizationMode};
pub use transform::{NormalizeMode, PolarityMode, TransformContext, TransformStep};

use crate::config::EngineConfig;
use crate::error::{Result, SignalError};
use crate::signal::{PercentileRange, ValueRange};

/// A time series before post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSeries {
    pub times: Vec<f64>,
    pub values: Vec<f32>,
}

impl ResolvedSeries {
    pub fn new(times: Vec<f64>, values: Vec<f32>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(SignalError::ShapeMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        Ok(Self { times, values })
    }
}

/// Final series plus statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub times: Vec<f64>,
    pub values: Vec<f32>,
    pub raw_values: Option<Vec<f32>>,
    pub value_range: Option<ValueRange>,
    pub percentile_range: Option<PercentileRange>,
}

/// Average sample rate of a time axis, or `fallback` when it cannot be inferred.
pub fn infer_sample_rate(times: &[f64], fallback: f64) -> f64 {
    match (times.first(), times.last()) {
        (Some(first), Some(last)) if times.len() > 1 && last > first => {
            (times.len() - 1) as f64 / (last - first)
        }
        _ => fallback,
    }
}

/// Run the shared post-processing stages.
pub fn post_process(
    series: ResolvedSeries,
    transforms: &[TransformStep],
    stabilization: Option<&StabilizationConfig>,
    config: &EngineConfig,
) -> Result<PipelineOutput> {
    let ResolvedSeries { times, values } = series;
    let sample_rate = infer_sample_rate(&times, config.fallback_sample_rate_hz);
    let ctx = TransformContext {
        sample_rate,
        times: &times,
    };

    let mut values = transform::apply_chain(values, transforms, &ctx)?;
    transform::polarity_of(transforms).apply(&mut values);

    let mut raw_values = None;
    if let Some(stabilization) = stabilization.filter(|s| s.is_active()) {
        stabilization.validate()?;
        let stabilized = stabilize::stabilize(&values, stabilization, sample_rate);
        if stabilized.iter().any(|v| !v.is_finite()) {
            return Err(SignalError::NonFiniteOutput {
                stage: "stabilization".to_string(),
            });
        }
        raw_values = Some(std::mem::replace(&mut values, stabilized));
    }

    if values.len() != times.len() {
        return Err(SignalError::ShapeMismatch {
            times: times.len(),
            values: values.len(),
        });
    }

    let value_range = stats::value_range(&values);
    let percentile_range =
        stats::percentile_range(&values, config.percentile_low, config.percentile_high);

    Ok(PipelineOutput {
        times,
        values,
        raw_values,
        value_range,
        percentile_range,
    })
}
