//! Event stream rendering
//!
//! Converts a discrete event list into a dense signal sampled at a fixed rate
//! over the whole source duration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};
use crate::providers::AnalysisEvent;

/// Gaussian kernels are truncated at this many standard deviations.
const GAUSSIAN_EXTENT_SIGMAS: f64 = 4.0;

/// Attack/decay kernels are truncated after this many decay time constants.
const DECAY_EXTENT_CONSTANTS: f64 = 6.0;

/// Kernel drawn for each event by the `envelope` reducer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EnvelopeShape {
    /// Unit spike at the nearest sample.
    Impulse,
    /// Symmetric bell; `width_ms` is the standard deviation.
    Gaussian { width_ms: f64 },
    /// Linear rise over `attack_ms`, hold for the event's duration, then
    /// exponential fall with time constant `decay_ms`.
    AttackDecay { attack_ms: f64, decay_ms: f64 },
}

/// How events become one value per sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventReducer {
    /// Sum of per-event kernels.
    #[default]
    Envelope,
    /// Events inside the window.
    Count,
    /// Events per second inside the window.
    Density,
    /// Sum of event weights inside the window.
    WeightSum,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowKind {
    #[default]
    Seconds,
}

/// Aggregation window centred on each sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWindow {
    #[serde(default)]
    pub kind: WindowKind,
    pub window_size: f64,
}

impl Default for EventWindow {
    fn default() -> Self {
        Self {
            kind: WindowKind::Seconds,
            window_size: 0.5,
        }
    }
}

impl EnvelopeShape {
    pub fn validate(&self) -> Result<()> {
        let check = |param: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(SignalError::InvalidParameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    expected: ">= 0 ms".to_string(),
                })
            }
        };
        match *self {
            EnvelopeShape::Impulse => Ok(()),
            EnvelopeShape::Gaussian { width_ms } => check("envelopeShape.widthMs", width_ms),
            EnvelopeShape::AttackDecay {
                attack_ms,
                decay_ms,
            } => {
                check("envelopeShape.attackMs", attack_ms)?;
                check("envelopeShape.decayMs", decay_ms)
            }
        }
    }
}

/// Sample timestamps covering `[0, duration]` at `rate`.
pub fn sample_times(duration: f64, rate: f64) -> Vec<f64> {
    let count = (duration.max(0.0) * rate).floor() as usize + 1;
    (0..count).map(|i| i as f64 / rate).collect()
}

/// Render `events` with the configured reducer.
///
/// Fails with `InvalidParameter` when `duration` would need more than
/// `max_samples` samples at `rate`.
pub fn render_events(
    events: &[AnalysisEvent],
    duration: f64,
    rate: f64,
    max_samples: usize,
    reducer: EventReducer,
    window: &EventWindow,
    shape: &EnvelopeShape,
) -> Result<(Vec<f64>, Vec<f32>)> {
    // floor(span) + 1 samples fit iff span < max_samples.
    let span = duration.max(0.0) * rate;
    if !(span.is_finite() && span < max_samples as f64) {
        return Err(SignalError::InvalidParameter {
            param: "duration".to_string(),
            value: duration.to_string(),
            expected: format!("at most {max_samples} samples at {rate} Hz"),
        });
    }
    let times = sample_times(duration, rate);
    let values = match reducer {
        EventReducer::Envelope => {
            shape.validate()?;
            render_envelope(events, times.len(), rate, shape)
        }
        EventReducer::Count | EventReducer::Density | EventReducer::WeightSum => {
            if !(window.window_size.is_finite() && window.window_size > 0.0) {
                return Err(SignalError::InvalidParameter {
                    param: "window.windowSize".to_string(),
                    value: window.window_size.to_string(),
                    expected: "> 0 seconds".to_string(),
                });
            }
            window_aggregate(events, &times, window.window_size, reducer)
        }
    };
    Ok((times, values))
}

/// Sum one kernel per event into a buffer of `len` samples.
pub fn render_envelope(
    events: &[AnalysisEvent],
    len: usize,
    rate: f64,
    shape: &EnvelopeShape,
) -> Vec<f32> {
    let mut out = vec![0.0f32; len];
    if len == 0 {
        return out;
    }
    let last = (len - 1) as f64;

    for event in events {
        let weight = event.weight_or_unit();
        let centre = event.time * rate;
        match *shape {
            EnvelopeShape::Impulse => {
                let index = centre.round();
                if (0.0..=last).contains(&index) {
                    out[index as usize] += weight;
                }
            }
            EnvelopeShape::Gaussian { width_ms } => {
                let sigma = width_ms / 1000.0 * rate;
                if sigma <= 0.0 {
                    let index = centre.round();
                    if (0.0..=last).contains(&index) {
                        out[index as usize] += weight;
                    }
                    continue;
                }
                let extent = GAUSSIAN_EXTENT_SIGMAS * sigma;
                let start = (centre - extent).ceil().max(0.0);
                let end = (centre + extent).floor().min(last);
                let mut i = start;
                while i <= end {
                    let z = (i - centre) / sigma;
                    out[i as usize] += weight * (-0.5 * z * z).exp() as f32;
                    i += 1.0;
                }
            }
            EnvelopeShape::AttackDecay {
                attack_ms,
                decay_ms,
            } => {
                let attack = attack_ms / 1000.0 * rate;
                let hold = event.duration.unwrap_or(0.0).max(0.0) * rate;
                let decay = decay_ms / 1000.0 * rate;
                let peak_end = centre + attack + hold;
                let end = (peak_end + DECAY_EXTENT_CONSTANTS * decay).floor().min(last);
                let mut i = centre.ceil().max(0.0);
                while i <= end {
                    let offset = i - centre;
                    let level = if offset < attack {
                        offset / attack
                    } else if i <= peak_end {
                        1.0
                    } else if decay > 0.0 {
                        (-(i - peak_end) / decay).exp()
                    } else {
                        0.0
                    };
                    out[i as usize] += weight * level as f32;
                    i += 1.0;
                }
            }
        }
    }
    out
}

/// Windowed count/density/weight sum; `events` need not be sorted.
fn window_aggregate(
    events: &[AnalysisEvent],
    times: &[f64],
    window_size: f64,
    reducer: EventReducer,
) -> Vec<f32> {
    let mut sorted: Vec<&AnalysisEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let half = window_size / 2.0;
    let mut lo = 0;
    let mut hi = 0;
    times
        .iter()
        .map(|&t| {
            while lo < sorted.len() && sorted[lo].time < t - half {
                lo += 1;
            }
            hi = hi.max(lo);
            while hi < sorted.len() && sorted[hi].time <= t + half {
                hi += 1;
            }
            let inside = &sorted[lo..hi];
            match reducer {
                EventReducer::Count => inside.len() as f32,
                EventReducer::Density => (inside.len() as f64 / window_size) as f32,
                EventReducer::WeightSum => inside.iter().map(|e| e.weight_or_unit()).sum(),
                EventReducer::Envelope => 0.0,
            }
        })
        .collect()
}
