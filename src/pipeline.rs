// pipeline.rs — one positioning session: preprocessor + estimator
//
// Each accelerometer tick runs the preprocessor and feeds the resulting
// linear acceleration into the estimator's predict step. Position fixes run
// the correct step. Independent of threads and I/O, so recorded sessions can
// be replayed through exactly the same code.

use log::{debug, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PResult, PositioningError};
use crate::filters::{KalmanEstimator, KalmanState};
use crate::motion::{MotionCue, MotionPreprocessor};
use crate::types::{AccelerometerData, LocationData, RawAccelerationSample};

/// Result of one accelerometer tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub data: AccelerometerData,
    pub cue: Option<MotionCue>,
    pub state: KalmanState,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub state: KalmanState,
    pub gravity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
    pub samples: u64,
    pub rejected_samples: u64,
    pub fixes: u64,
    pub rejected_fixes: u64,
    pub cues: u64,
    pub last_cue: Option<MotionCue>,
}

pub struct PositioningPipeline {
    preprocessor: MotionPreprocessor,
    estimator: KalmanEstimator,
    samples: u64,
    rejected_samples: u64,
    cues: u64,
    last_cue: Option<MotionCue>,
}

impl PositioningPipeline {
    pub fn new(config: &PipelineConfig, initial: LocationData) -> PResult<Self> {
        config.validate()?;
        let preprocessor = MotionPreprocessor::new(config.preprocessor.clone());
        let estimator = KalmanEstimator::configure_with(&config.estimator, initial)?;
        Ok(Self::from_parts(preprocessor, estimator))
    }

    pub fn from_parts(preprocessor: MotionPreprocessor, estimator: KalmanEstimator) -> Self {
        Self {
            preprocessor,
            estimator,
            samples: 0,
            rejected_samples: 0,
            cues: 0,
            last_cue: None,
        }
    }

    /// Preprocess one sample and predict with its linear acceleration. A
    /// non-finite sample is rejected before it reaches either filter.
    pub fn on_acceleration(&mut self, raw: RawAccelerationSample) -> PResult<PipelineOutput> {
        if !raw.is_finite() {
            self.rejected_samples += 1;
            warn!("[pipeline] dropping non-finite sample ({}, {}, {})", raw.x, raw.y, raw.z);
            return Err(PositioningError::InvalidMeasurement(format!(
                "acceleration ({}, {}, {})",
                raw.x, raw.y, raw.z
            )));
        }

        let update = self.preprocessor.process_detailed(raw);
        self.estimator.predict(update.linear_acceleration);
        self.samples += 1;

        if let Some(cue) = update.cue {
            self.cues += 1;
            self.last_cue = Some(cue);
        }

        Ok(PipelineOutput {
            data: update.data,
            cue: update.cue,
            state: self.estimator.current_state(),
        })
    }

    /// Correct with a position fix. On error the predicted state stays in
    /// place and the session continues.
    pub fn on_position_fix(&mut self, fix: LocationData) -> PResult<KalmanState> {
        self.estimator.correct(fix.as_vector())?;
        let state = self.estimator.current_state();
        debug!(
            "fix ({:.3}, {:.3}, {:.3}) -> estimate ({:.3}, {:.3}, {:.3}) ±{:.3}",
            fix.x,
            fix.y,
            fix.z,
            state.state[0],
            state.state[1],
            state.state[2],
            state.position_uncertainty()
        );
        Ok(state)
    }

    pub fn current_state(&self) -> KalmanState {
        self.estimator.current_state()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let filter = self.preprocessor.state();
        PipelineSnapshot {
            state: self.estimator.current_state(),
            gravity: filter.gravity,
            linear_acceleration: filter.linear_acceleration,
            samples: self.samples,
            rejected_samples: self.rejected_samples,
            fixes: self.estimator.correct_count(),
            rejected_fixes: self.estimator.rejected_count(),
            cues: self.cues,
            last_cue: self.last_cue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pipeline_at_origin() -> PositioningPipeline {
        PositioningPipeline::new(&PipelineConfig::default(), LocationData::new(0.0, 0.0, 0.0)).unwrap()
    }

    #[test]
    fn test_stationary_device_settles() {
        let mut pipeline = pipeline_at_origin();
        for _ in 0..200 {
            pipeline.on_acceleration(RawAccelerationSample::new(0.0, 9.81, 0.0)).unwrap();
        }
        for _ in 0..20 {
            pipeline.on_position_fix(LocationData::new(0.0, 0.0, 0.0)).unwrap();
        }

        let snapshot = pipeline.snapshot();
        assert_abs_diff_eq!(snapshot.gravity.y, 9.81, epsilon = 1e-6);
        assert_eq!(snapshot.samples, 200);
        assert_eq!(snapshot.fixes, 20);
        assert_eq!(snapshot.rejected_fixes, 0);
    }

    #[test]
    fn test_acceleration_drives_prediction() {
        let mut pipeline = pipeline_at_origin();
        let out = pipeline.on_acceleration(RawAccelerationSample::new(5.0, 0.0, 0.0)).unwrap();

        // First sample: gravity = 1.0, linear = 4.0 along x.
        assert_abs_diff_eq!(out.data.magnitude, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.state.state[3], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(out.state.state[0], 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_invalid_initial_location() {
        let result = PositioningPipeline::new(
            &PipelineConfig::default(),
            LocationData::new(f64::INFINITY, 0.0, 0.0),
        );
        assert!(matches!(result, Err(PositioningError::InvalidLocation(_))));
    }

    #[test]
    fn test_bad_fix_keeps_predicted_state() {
        let mut pipeline = pipeline_at_origin();
        pipeline.on_acceleration(RawAccelerationSample::new(1.0, 2.0, 3.0)).unwrap();
        let predicted = pipeline.current_state();

        let err = pipeline.on_position_fix(LocationData::new(f64::NAN, 0.0, 0.0)).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(pipeline.current_state(), predicted);
        assert_eq!(pipeline.snapshot().rejected_fixes, 1);
    }

    #[test]
    fn test_non_finite_sample_rejected_and_session_recovers() {
        let mut pipeline = pipeline_at_origin();
        let err = pipeline
            .on_acceleration(RawAccelerationSample::new(f64::NAN, 9.8, 0.0))
            .unwrap_err();
        assert!(matches!(err, PositioningError::InvalidMeasurement(_)));
        assert!(err.is_recoverable());
        assert!(pipeline.on_acceleration(RawAccelerationSample::new(0.0, f64::INFINITY, 0.0)).is_err());

        for _ in 0..100 {
            pipeline.on_acceleration(RawAccelerationSample::new(0.0, 9.8, 0.0)).unwrap();
        }
        for _ in 0..10 {
            pipeline.on_position_fix(LocationData::new(0.0, 0.0, 0.0)).unwrap();
        }

        let snapshot = pipeline.snapshot();
        assert!(snapshot.gravity.iter().all(|v| v.is_finite()));
        assert!(snapshot.state.is_finite());
        assert_eq!(snapshot.samples, 100);
        assert_eq!(snapshot.rejected_samples, 2);
        assert_eq!(snapshot.fixes, 10);
        assert_eq!(snapshot.rejected_fixes, 0);
    }

    #[test]
    fn test_cue_counted_in_snapshot() {
        let mut pipeline = pipeline_at_origin();
        for _ in 0..50 {
            pipeline.on_acceleration(RawAccelerationSample::new(0.0, 9.81, 0.0)).unwrap();
        }
        // The zero-initialised gravity estimate cues during warm-up.
        let warm_up_cues = pipeline.snapshot().cues;
        assert!(warm_up_cues > 0);

        // Sudden drop against gravity.
        let out = pipeline.on_acceleration(RawAccelerationSample::new(0.0, 4.0, 0.0)).unwrap();
        assert_eq!(out.cue, Some(MotionCue::Up));

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.cues, warm_up_cues + 1);
        assert_eq!(snapshot.last_cue, Some(MotionCue::Up));
    }
}
