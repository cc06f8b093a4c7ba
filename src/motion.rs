// motion.rs — gravity / linear-acceleration separation for raw accelerometer samples
//
// A first-order exponential low-pass tracks gravity; whatever the low-pass
// rejects is treated as motion. The angle between the two vectors gives an
// advisory up/down cue that never feeds back into the estimator.

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AccelerometerData, RawAccelerationSample};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    /// Smoothing coefficient of the gravity low-pass (t / (t + dT)).
    pub alpha: f64,
    /// Linear-acceleration magnitude a cue needs before it is classified.
    pub cue_magnitude_threshold: f64,
    /// |cos angle| above which the motion counts as along/against gravity.
    pub cue_cos_threshold: f64,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            cue_magnitude_threshold: 2.0,
            cue_cos_threshold: 0.5,
        }
    }
}

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// Advisory vertical-motion classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionCue {
    Up,
    Down,
}

impl fmt::Display for MotionCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionCue::Up => write!(f, "Up"),
            MotionCue::Down => write!(f, "Down"),
        }
    }
}

/// Filter memory carried from one sample to the next.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub gravity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            gravity: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
        }
    }
}

/// Everything one `process` step derives from a raw sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionUpdate {
    pub data: AccelerometerData,
    pub gravity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
    /// `None` when either vector has zero length.
    pub cos_angle: Option<f64>,
    pub cue: Option<MotionCue>,
}

// ─── Preprocessor ────────────────────────────────────────────────────────────

pub struct MotionPreprocessor {
    config: PreprocessorConfig,
    state: FilterState,
    samples: u64,
}

impl MotionPreprocessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Self::with_state(config, FilterState::default())
    }

    /// Resume from a previously captured filter state.
    pub fn with_state(config: PreprocessorConfig, state: FilterState) -> Self {
        Self { config, state, samples: 0 }
    }

    pub fn process(&mut self, raw: RawAccelerationSample) -> AccelerometerData {
        self.process_detailed(raw).data
    }

    pub fn process_detailed(&mut self, raw: RawAccelerationSample) -> MotionUpdate {
        let alpha = self.config.alpha;
        let input = raw.as_vector();

        self.state.gravity = self.state.gravity * alpha + input * (1.0 - alpha);
        self.state.linear_acceleration = input - self.state.gravity;
        self.samples += 1;

        let gravity = self.state.gravity;
        let linear = self.state.linear_acceleration;
        let linear_norm = linear.norm();
        let cos_angle = cosine_between(&gravity, &linear);
        let cue = self.classify(linear_norm, cos_angle);

        if let Some(cue) = cue {
            debug!(
                "motion cue {} (sample {}, |a|={:.3}, cos={:.3})",
                cue,
                self.samples,
                linear_norm,
                cos_angle.unwrap_or(0.0)
            );
        }

        MotionUpdate {
            data: AccelerometerData {
                x: raw.x,
                y: raw.y,
                z: raw.z,
                magnitude: linear_norm,
            },
            gravity,
            linear_acceleration: linear,
            cos_angle,
            cue,
        }
    }

    fn classify(&self, linear_norm: f64, cos_angle: Option<f64>) -> Option<MotionCue> {
        if linear_norm <= self.config.cue_magnitude_threshold {
            return None;
        }
        let cos = cos_angle?;
        if cos > self.config.cue_cos_threshold {
            Some(MotionCue::Down)
        } else if cos < -self.config.cue_cos_threshold {
            Some(MotionCue::Up)
        } else {
            None
        }
    }

    /// Copy of the current filter memory.
    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.state = FilterState::default();
        self.samples = 0;
    }
}

/// Cosine of the angle between two vectors, or `None` if it is undefined.
fn cosine_between(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<f64> {
    let denom = a.norm() * b.norm();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let cos = a.dot(b) / denom;
    cos.is_finite().then_some(cos)
}
