//! 2D reduction: feature-range resolution and per-frame statistics
//!
//! Every reducer returns exactly one value per frame. The difference-based
//! reducers (`flux`, `onsetStrength`) have no previous frame for the first
//! `lag` frames and emit 0 there instead of trimming.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SignalError};
use crate::providers::FeatureMatrix;

/// Which feature indices of a 2D source feed the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FeatureRange {
    FullSpectrum,
    /// Range taken from a frequency band definition.
    BandReference { band_id: String },
    FrequencyRange { low_hz: f64, high_hz: f64 },
    /// Inclusive coefficient indices.
    CoefficientRange { low_coef: usize, high_coef: usize },
}

/// Statistic collapsing the feature axis of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reducer2D {
    Mean,
    Max,
    Sum,
    /// Sum of positive differences against the frame `lag` frames earlier.
    Flux,
    /// Mean positive difference of log-compressed magnitudes.
    OnsetStrength,
}

/// Optional reducer parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReducerParams {
    /// Frame distance for difference reducers (default 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<usize>,
    /// Log compression factor for `onsetStrength` (default 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<f32>,
}

impl ReducerParams {
    fn lag(&self) -> usize {
        self.lag.unwrap_or(1).max(1)
    }

    fn compression(&self) -> f32 {
        self.compression.unwrap_or(1.0)
    }
}

/// Resolve a feature range to a half-open index interval.
pub fn resolve_range(range: &FeatureRange, matrix: &FeatureMatrix) -> Result<Range<usize>> {
    let width = matrix.width();
    match range {
        FeatureRange::FullSpectrum => Ok(0..width),
        FeatureRange::BandReference { band_id } => {
            warn!(
                band_id = %band_id,
                "bandReference range is not resolved; using the full spectrum"
            );
            Ok(0..width)
        }
        FeatureRange::FrequencyRange { low_hz, high_hz } => {
            if !(low_hz <= high_hz) {
                return Err(SignalError::InvalidParameter {
                    param: "range.lowHz/highHz".to_string(),
                    value: format!("{low_hz}/{high_hz}"),
                    expected: "lowHz <= highHz".to_string(),
                });
            }
            let Some(frequencies) = &matrix.feature_frequencies else {
                // Not frequency-indexed: the range has no meaning here.
                return Ok(0..width);
            };
            let start = frequencies.iter().position(|&f| f >= *low_hz);
            let end = frequencies.iter().rposition(|&f| f <= *high_hz);
            match (start, end) {
                (Some(start), Some(end)) if start <= end => Ok(start..end + 1),
                _ => Err(SignalError::InvalidParameter {
                    param: "range".to_string(),
                    value: format!("{low_hz}-{high_hz} Hz"),
                    expected: "a range covering at least one feature bin".to_string(),
                }),
            }
        }
        FeatureRange::CoefficientRange {
            low_coef,
            high_coef,
        } => {
            if low_coef > high_coef || *low_coef >= width {
                return Err(SignalError::InvalidParameter {
                    param: "range.lowCoef/highCoef".to_string(),
                    value: format!("{low_coef}/{high_coef}"),
                    expected: format!("lowCoef <= highCoef, lowCoef < {width}"),
                });
            }
            Ok(*low_coef..(*high_coef + 1).min(width))
        }
    }
}

/// Collapse each frame of `matrix` over `bins` with `reducer`.
pub fn reduce_matrix(
    matrix: &FeatureMatrix,
    bins: Range<usize>,
    reducer: Reducer2D,
    params: &ReducerParams,
) -> Vec<f32> {
    let frames = &matrix.frames;
    match reducer {
        Reducer2D::Mean => frames
            .iter()
            .map(|frame| {
                let slice = &frame[bins.clone()];
                if slice.is_empty() {
                    0.0
                } else {
                    slice.iter().sum::<f32>() / slice.len() as f32
                }
            })
            .collect(),
        Reducer2D::Max => frames
            .iter()
            .map(|frame| {
                frame[bins.clone()]
                    .iter()
                    .copied()
                    .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.max(v))))
                    .unwrap_or(0.0)
            })
            .collect(),
        Reducer2D::Sum => frames
            .iter()
            .map(|frame| frame[bins.clone()].iter().sum())
            .collect(),
        Reducer2D::Flux => positive_difference(frames, bins, params.lag(), |v| v, false),
        Reducer2D::OnsetStrength => {
            let gamma = params.compression();
            positive_difference(frames, bins, params.lag(), |v| (gamma * v.max(0.0)).ln_1p(), true)
        }
    }
}

fn positive_difference(
    frames: &[Vec<f32>],
    bins: Range<usize>,
    lag: usize,
    map: impl Fn(f32) -> f32,
    average: bool,
) -> Vec<f32> {
    let count = bins.len();
    (0..frames.len())
        .map(|t| {
            if t < lag || count == 0 {
                return 0.0;
            }
            let current = &frames[t][bins.clone()];
            let previous = &frames[t - lag][bins.clone()];
            let total: f32 = current
                .iter()
                .zip(previous)
                .map(|(&c, &p)| (map(c) - map(p)).max(0.0))
                .sum();
            if average {
                total / count as f32
            } else {
                total
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix {
            times: vec![0.0, 0.1, 0.2],
            frames: vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![2.0, 2.0, 2.0, 2.0],
                vec![0.0, 4.0, 0.0, 8.0],
            ],
            feature_frequencies: Some(vec![100.0, 200.0, 400.0, 800.0]),
        }
    }

    #[test]
    fn test_full_spectrum_mean() {
        let m = matrix();
        let bins = resolve_range(&FeatureRange::FullSpectrum, &m).unwrap();
        let out = reduce_matrix(&m, bins, Reducer2D::Mean, &ReducerParams::default());
        assert_eq!(out, vec![2.5, 2.0, 3.0]);
    }

    #[test]
    fn test_band_reference_falls_back_to_full_spectrum() {
        let m = matrix();
        let bins = resolve_range(
            &FeatureRange::BandReference {
                band_id: "low".to_string(),
            },
            &m,
        )
        .unwrap();
        assert_eq!(bins, 0..4);
    }

    #[test]
    fn test_frequency_range_selects_bins() {
        let m = matrix();
        let range = FeatureRange::FrequencyRange {
            low_hz: 150.0,
            high_hz: 500.0,
        };
        let bins = resolve_range(&range, &m).unwrap();
        assert_eq!(bins, 1..3);
        let out = reduce_matrix(&m, bins, Reducer2D::Max, &ReducerParams::default());
        assert_eq!(out, vec![3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_frequency_range_without_axis_passes_through() {
        let mut m = matrix();
        m.feature_frequencies = None;
        let range = FeatureRange::FrequencyRange {
            low_hz: 150.0,
            high_hz: 500.0,
        };
        assert_eq!(resolve_range(&range, &m).unwrap(), 0..4);
    }

    #[test]
    fn test_frequency_range_outside_axis_is_error() {
        let m = matrix();
        let range = FeatureRange::FrequencyRange {
            low_hz: 5000.0,
            high_hz: 9000.0,
        };
        assert!(resolve_range(&range, &m).is_err());
    }

    #[test]
    fn test_coefficient_range_is_inclusive_and_clamped() {
        let m = matrix();
        let range = FeatureRange::CoefficientRange {
            low_coef: 2,
            high_coef: 10,
        };
        let bins = resolve_range(&range, &m).unwrap();
        assert_eq!(bins, 2..4);
        let out = reduce_matrix(&m, bins, Reducer2D::Sum, &ReducerParams::default());
        assert_eq!(out, vec![7.0, 4.0, 8.0]);
    }

    #[test]
    fn test_flux_keeps_frame_count() {
        let m = matrix();
        let out = reduce_matrix(&m, 0..4, Reducer2D::Flux, &ReducerParams::default());
        assert_eq!(out.len(), m.frame_count());
        assert_eq!(out[0], 0.0);
        // frame1 - frame0 positive parts: 1 + 0 + 0 + 0
        assert_eq!(out[1], 1.0);
        // frame2 - frame1 positive parts: 0 + 2 + 0 + 6
        assert_eq!(out[2], 8.0);
    }

    #[test]
    fn test_onset_strength_with_lag() {
        let m = matrix();
        let params = ReducerParams {
            lag: Some(2),
            compression: Some(1.0),
        };
        let out = reduce_matrix(&m, 0..4, Reducer2D::OnsetStrength, &params);
        assert_eq!(&out[..2], &[0.0, 0.0]);
        let expected = ((5.0f32.ln() - 3.0f32.ln()) + (9.0f32.ln() - 5.0f32.ln())) / 4.0;
        assert_abs_diff_eq!(out[2], expected, epsilon = 1e-6);
    }
}
