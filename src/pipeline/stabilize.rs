//! Stabilization (causal envelope follower)
//!
//! One-pole smoothing with separate attack and release time constants, the
//! same coefficient form a compressor detector uses: `coeff = exp(-1 / samples)`
//! where `samples` is the time constant expressed in samples.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Detector applied before smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StabilizationMode {
    None,
    /// Follow the value directly.
    Peak,
    /// Follow the squared value; output is its square root.
    Rms,
}

/// Whether the follower output replaces the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeMode {
    Raw,
    Follow,
}

/// Stabilization settings of a signal definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizationConfig {
    pub mode: StabilizationMode,
    pub envelope_mode: EnvelopeMode,
    pub attack_time_sec: f64,
    pub release_time_sec: f64,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            mode: StabilizationMode::Peak,
            envelope_mode: EnvelopeMode::Follow,
            attack_time_sec: 0.005,
            release_time_sec: 0.2,
        }
    }
}

impl StabilizationConfig {
    /// Whether the follower runs at all.
    pub fn is_active(&self) -> bool {
        self.mode != StabilizationMode::None && self.envelope_mode != EnvelopeMode::Raw
    }

    /// Validate time constants.
    pub fn validate(&self) -> Result<()> {
        for (param, value) in [
            ("stabilization.attackTimeSec", self.attack_time_sec),
            ("stabilization.releaseTimeSec", self.release_time_sec),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SignalError::InvalidParameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    expected: ">= 0 seconds".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Asymmetric one-pole envelope follower.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    state: f64,
}

impl EnvelopeFollower {
    pub fn new(attack_time_sec: f64, release_time_sec: f64, sample_rate: f64) -> Self {
        Self {
            attack_coeff: time_constant_coeff(attack_time_sec, sample_rate),
            release_coeff: time_constant_coeff(release_time_sec, sample_rate),
            state: 0.0,
        }
    }

    /// Feed one sample and return the new envelope level.
    pub fn process(&mut self, input: f64) -> f64 {
        let coeff = if input > self.state {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.state = coeff * self.state + (1.0 - coeff) * input;
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// A zero time constant means the follower tracks instantly.
fn time_constant_coeff(time_sec: f64, sample_rate: f64) -> f64 {
    let samples = time_sec * sample_rate;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Run the follower over `values`.
pub fn stabilize(values: &[f32], config: &StabilizationConfig, sample_rate: f64) -> Vec<f32> {
    let mut follower =
        EnvelopeFollower::new(config.attack_time_sec, config.release_time_sec, sample_rate);
    match config.mode {
        StabilizationMode::None => values.to_vec(),
        StabilizationMode::Peak => values
            .iter()
            .map(|&v| follower.process(v as f64) as f32)
            .collect(),
        StabilizationMode::Rms => values
            .iter()
            .map(|&v| {
                let v = v as f64;
                follower.process(v * v).max(0.0).sqrt() as f32
            })
            .collect(),
    }
}
