use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PResult, PositioningError};
use crate::filters::EstimatorConfig;
use crate::motion::PreprocessorConfig;

/// Tuning for one positioning session. Every field is optional in JSON;
/// missing values fall back to the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocessor: PreprocessorConfig,
    pub estimator: EstimatorConfig,
    /// Bounded queue length between sensor producers and the worker thread.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocessor: PreprocessorConfig::default(),
            estimator: EstimatorConfig::default(),
            queue_capacity: 256,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> PResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> PResult<()> {
        let p = &self.preprocessor;
        if !(p.alpha.is_finite() && (0.0..1.0).contains(&p.alpha)) {
            return Err(invalid(format!("alpha must be in [0, 1), got {}", p.alpha)));
        }
        if !(p.cue_magnitude_threshold.is_finite() && p.cue_magnitude_threshold >= 0.0) {
            return Err(invalid(format!(
                "cue_magnitude_threshold must be non-negative, got {}",
                p.cue_magnitude_threshold
            )));
        }
        if !(p.cue_cos_threshold.is_finite() && (0.0..=1.0).contains(&p.cue_cos_threshold)) {
            return Err(invalid(format!(
                "cue_cos_threshold must be in [0, 1], got {}",
                p.cue_cos_threshold
            )));
        }

        let e = &self.estimator;
        if !(e.time_step.is_finite() && e.time_step > 0.0) {
            return Err(invalid(format!("time_step must be positive, got {}", e.time_step)));
        }
        if !(e.singular_tolerance.is_finite() && e.singular_tolerance >= 0.0) {
            return Err(invalid(format!(
                "singular_tolerance must be non-negative, got {}",
                e.singular_tolerance
            )));
        }

        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> PositioningError {
    PositioningError::InvalidParameters(message)
}
