//! Summary statistics for computed series.

use crate::signal::{PercentileRange, ValueRange};

/// Min and max by linear scan, ignoring non-finite values.
pub fn value_range(values: &[f32]) -> Option<ValueRange> {
    let mut finite = values.iter().copied().filter(|v| v.is_finite());
    let first = finite.next()?;
    let (min, max) = finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    Some(ValueRange { min, max })
}

/// Percentile `p` (0-100) with linear interpolation between closest ranks.
pub fn percentile(values: &[f32], p: f64) -> Option<f32> {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(percentile_of_sorted(&sorted, p))
}

fn percentile_of_sorted(sorted: &[f32], p: f64) -> f32 {
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Low/high percentile pair computed from one sort.
pub fn percentile_range(values: &[f32], low: f64, high: f64) -> Option<PercentileRange> {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(PercentileRange {
        p5: percentile_of_sorted(&sorted, low),
        p95: percentile_of_sorted(&sorted, high),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_value_range_skips_nan() {
        let range = value_range(&[f32::NAN, 3.0, -1.0, 2.0]).unwrap();
        assert_eq!(range, ValueRange { min: -1.0, max: 3.0 });
        assert!(value_range(&[]).is_none());
    }

    #[test]
    fn test_percentile_interpolates() {
        let values: Vec<f32> = (0..=100).map(|i| i as f32).collect();
        assert_abs_diff_eq!(percentile(&values, 5.0).unwrap(), 5.0);
        assert_abs_diff_eq!(percentile(&values, 95.0).unwrap(), 95.0);

        assert_abs_diff_eq!(percentile(&[0.0, 10.0], 25.0).unwrap(), 2.5);
    }

    #[test]
    fn test_percentile_range_single_value() {
        let range = percentile_range(&[4.0], 5.0, 95.0).unwrap();
        assert_eq!(range, PercentileRange { p5: 4.0, p95: 4.0 });
    }
}
