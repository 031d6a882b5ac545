//! Transform chain
//!
//! Steps run in definition order after reduction. Each step is a pure function
//! of the values plus the time axis. `polarity` steps are not applied in-line:
//! the last one in the chain decides the polarity applied after the chain.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Time-axis information available to every step.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub sample_rate: f64,
    pub times: &'a [f64],
}

/// Normalization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NormalizeMode {
    /// Map to [0, 1].
    MinMax,
    /// Zero mean, unit standard deviation.
    ZScore,
}

/// Post-reduction sign handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolarityMode {
    #[default]
    Signed,
    /// Negative values clamp to zero.
    Positive,
    /// Positive values clamp to zero.
    Negative,
}

impl PolarityMode {
    pub fn apply(self, values: &mut [f32]) {
        match self {
            PolarityMode::Signed => {}
            PolarityMode::Positive => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            PolarityMode::Negative => values.iter_mut().for_each(|v| *v = v.min(0.0)),
        }
    }
}

/// One step of a transform chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransformStep {
    /// Centred moving average over `window_sec`.
    Smooth { window_sec: f64 },
    Normalize { mode: NormalizeMode },
    Scale { factor: f32 },
    Offset { amount: f32 },
    Clamp { min: f32, max: f32 },
    Abs,
    /// Rate of change per second.
    Diff,
    /// Zero every value whose magnitude is below `threshold`.
    Gate { threshold: f32 },
    /// Sign-preserving power curve.
    Power { exponent: f32 },
    Invert,
    Polarity { mode: PolarityMode },
}

impl TransformStep {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TransformStep::Smooth { .. } => "smooth",
            TransformStep::Normalize { .. } => "normalize",
            TransformStep::Scale { .. } => "scale",
            TransformStep::Offset { .. } => "offset",
            TransformStep::Clamp { .. } => "clamp",
            TransformStep::Abs => "abs",
            TransformStep::Diff => "diff",
            TransformStep::Gate { .. } => "gate",
            TransformStep::Power { .. } => "power",
            TransformStep::Invert => "invert",
            TransformStep::Polarity { .. } => "polarity",
        }
    }

    /// Validate step parameters.
    pub fn validate(&self) -> Result<()> {
        match *self {
            TransformStep::Smooth { window_sec } if !(window_sec > 0.0) => {
                Err(invalid("smooth.windowSec", window_sec, "> 0 seconds"))
            }
            TransformStep::Clamp { min, max } if !(min <= max) => {
                Err(invalid("clamp.min/max", format!("{min}/{max}"), "min <= max"))
            }
            TransformStep::Gate { threshold } if !(threshold >= 0.0) => {
                Err(invalid("gate.threshold", threshold, ">= 0"))
            }
            TransformStep::Power { exponent } if !(exponent.is_finite() && exponent > 0.0) => {
                Err(invalid("power.exponent", exponent, "a positive finite exponent"))
            }
            TransformStep::Scale { factor } if !factor.is_finite() => {
                Err(invalid("scale.factor", factor, "a finite factor"))
            }
            TransformStep::Offset { amount } if !amount.is_finite() => {
                Err(invalid("offset.amount", amount, "a finite amount"))
            }
            _ => Ok(()),
        }
    }

    /// Apply this step, returning the transformed values.
    pub fn apply(&self, mut values: Vec<f32>, ctx: &TransformContext<'_>) -> Vec<f32> {
        match *self {
            TransformStep::Smooth { window_sec } => {
                let window = (window_sec * ctx.sample_rate).round().max(1.0) as usize;
                moving_average(&values, window)
            }
            TransformStep::Normalize { mode } => {
                normalize(&mut values, mode);
                values
            }
            TransformStep::Scale { factor } => {
                values.iter_mut().for_each(|v| *v *= factor);
                values
            }
            TransformStep::Offset { amount } => {
                values.iter_mut().for_each(|v| *v += amount);
                values
            }
            TransformStep::Clamp { min, max } => {
                values.iter_mut().for_each(|v| *v = v.clamp(min, max));
                values
            }
            TransformStep::Abs => {
                values.iter_mut().for_each(|v| *v = v.abs());
                values
            }
            TransformStep::Diff => differentiate(&values, ctx.times),
            TransformStep::Gate { threshold } => {
                values.iter_mut().for_each(|v| {
                    if v.abs() < threshold {
                        *v = 0.0;
                    }
                });
                values
            }
            TransformStep::Power { exponent } => {
                values
                    .iter_mut()
                    .for_each(|v| *v = v.signum() * v.abs().powf(exponent));
                values
            }
            TransformStep::Invert => {
                values.iter_mut().for_each(|v| *v = -*v);
                values
            }
            TransformStep::Polarity { .. } => values,
        }
    }
}

fn invalid(param: &str, value: impl ToString, expected: &str) -> SignalError {
    SignalError::InvalidParameter {
        param: param.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// Polarity selected by a chain; the last `polarity` step wins.
pub fn polarity_of(chain: &[TransformStep]) -> PolarityMode {
    chain
        .iter()
        .rev()
        .find_map(|step| match step {
            TransformStep::Polarity { mode } => Some(*mode),
            _ => None,
        })
        .unwrap_or_default()
}

/// Run every non-polarity step in order.
///
/// Fails if a step produces NaN or infinity.
pub fn apply_chain(
    mut values: Vec<f32>,
    chain: &[TransformStep],
    ctx: &TransformContext<'_>,
) -> Result<Vec<f32>> {
    for step in chain {
        if matches!(step, TransformStep::Polarity { .. }) {
            continue;
        }
        step.validate()?;
        values = step.apply(values, ctx);
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SignalError::NonFiniteOutput {
                stage: format!("transform '{}'", step.name()),
            });
        }
    }
    Ok(values)
}

/// Centred moving average; edges average over the samples that exist.
fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f64);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }

    let before = (window - 1) / 2;
    let after = window / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(values.len());
            ((prefix[end] - prefix[start]) / (end - start) as f64) as f32
        })
        .collect()
}

fn normalize(values: &mut [f32], mode: NormalizeMode) {
    if values.is_empty() {
        return;
    }
    match mode {
        NormalizeMode::MinMax => {
            let min = values.iter().copied().fold(f32::INFINITY, f32::min);
            let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let span = max - min;
            if span > 0.0 {
                values.iter_mut().for_each(|v| *v = (*v - min) / span);
            } else {
                values.iter_mut().for_each(|v| *v = 0.0);
            }
        }
        NormalizeMode::ZScore => {
            let n = values.len() as f64;
            let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
            let variance = values
                .iter()
                .map(|&v| (v as f64 - mean).powi(2))
                .sum::<f64>()
                / n;
            let std = variance.sqrt();
            if std > 0.0 {
                values
                    .iter_mut()
                    .for_each(|v| *v = ((*v as f64 - mean) / std) as f32);
            } else {
                values.iter_mut().for_each(|v| *v = 0.0);
            }
        }
    }
}

/// Backward difference over the actual timestamps; the first sample is 0.
fn differentiate(values: &[f32], times: &[f64]) -> Vec<f32> {
    let mut out = vec![0.0; values.len()];
    for i in 1..values.len().min(times.len()) {
        let dt = times[i] - times[i - 1];
        if dt > 0.0 {
            out[i] = ((values[i] - values[i - 1]) as f64 / dt) as f32;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    fn ctx(times: &[f64]) -> TransformContext<'_> {
        TransformContext {
            sample_rate: 10.0,
            times,
        }
    }

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 0.1).collect()
    }

    #[test]
    fn test_smooth_preserves_length_and_mean_of_constant() {
        let times = axis(20);
        let values = vec![2.0; 20];
        let out = TransformStep::Smooth { window_sec: 0.5 }.apply(values, &ctx(&times));
        assert_eq!(out.len(), 20);
        for v in out {
            assert_abs_diff_eq!(v, 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_smooth_spreads_impulse() {
        let times = axis(9);
        let mut values = vec![0.0; 9];
        values[4] = 3.0;
        let out = TransformStep::Smooth { window_sec: 0.3 }.apply(values, &ctx(&times));
        assert_abs_diff_eq!(out[3], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[4], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[5], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[6], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_min_max() {
        let times = axis(3);
        let out = TransformStep::Normalize {
            mode: NormalizeMode::MinMax,
        }
        .apply(vec![2.0, 4.0, 6.0], &ctx(&times));
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_normalize_flat_signal_is_zero() {
        let times = axis(3);
        let out = TransformStep::Normalize {
            mode: NormalizeMode::ZScore,
        }
        .apply(vec![5.0, 5.0, 5.0], &ctx(&times));
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_diff_uses_timestamps() {
        let times = vec![0.0, 0.5, 1.0];
        let out = TransformStep::Diff.apply(vec![0.0, 1.0, 1.0], &ctx(&times));
        assert_eq!(out, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_polarity_last_wins() {
        let chain = vec![
            TransformStep::Polarity {
                mode: PolarityMode::Negative,
            },
            TransformStep::Abs,
            TransformStep::Polarity {
                mode: PolarityMode::Positive,
            },
        ];
        assert_eq!(polarity_of(&chain), PolarityMode::Positive);
        assert_eq!(polarity_of(&[]), PolarityMode::Signed);
    }

    #[test]
    fn test_polarity_modes() {
        let mut pos = vec![-1.0, 0.5];
        PolarityMode::Positive.apply(&mut pos);
        assert_eq!(pos, vec![0.0, 0.5]);

        let mut neg = vec![-1.0, 0.5];
        PolarityMode::Negative.apply(&mut neg);
        assert_eq!(neg, vec![-1.0, 0.0]);
    }

    #[test]
    fn test_chain_skips_polarity_and_applies_in_order() {
        let times = axis(2);
        let chain = vec![
            TransformStep::Offset { amount: 1.0 },
            TransformStep::Polarity {
                mode: PolarityMode::Positive,
            },
            TransformStep::Scale { factor: 2.0 },
        ];
        let out = apply_chain(vec![-3.0, 1.0], &chain, &ctx(&times)).unwrap();
        assert_eq!(out, vec![-4.0, 4.0]);
    }

    #[test]
    fn test_invalid_step_rejected() {
        let times = axis(2);
        let chain = vec![TransformStep::Clamp { min: 1.0, max: 0.0 }];
        let err = apply_chain(vec![0.0, 1.0], &chain, &ctx(&times)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test_case(TransformStep::Smooth { window_sec: 0.0 } ; "zero smoothing window")]
    #[test_case(TransformStep::Gate { threshold: -0.1 } ; "negative gate threshold")]
    #[test_case(TransformStep::Power { exponent: 0.0 } ; "zero exponent")]
    #[test_case(TransformStep::Scale { factor: f32::NAN } ; "nan scale factor")]
    #[test_case(TransformStep::Offset { amount: f32::INFINITY } ; "infinite offset")]
    fn test_step_validation_rejects(step: TransformStep) {
        let err = step.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_step_json_shape() {
        let step: TransformStep =
            serde_json::from_str(r#"{"kind": "smooth", "windowSec": 0.25}"#).unwrap();
        assert_eq!(step, TransformStep::Smooth { window_sec: 0.25 });
    }
}
