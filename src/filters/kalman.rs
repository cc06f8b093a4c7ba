//! Linear Kalman filter over 3D position and velocity.
//!
//! State layout: `[px, py, pz, vx, vy, vz]`. Acceleration from the motion
//! preprocessor enters as the control input; position fixes are the only
//! measurement.

use log::{debug, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{PResult, PositioningError};
use crate::types::{
    ControlMat, ControlVec, KalmanGainPos, LocationData, MeasurementMat, PositionNoise,
    PositionVec, StateMat, StateVec,
};

/// Fixed integration step [s]. Not measured from sensor timestamps.
pub const TIME_DELTA: f64 = 0.1;

const Q_POS: f64 = 0.000025;
const Q_POS_VEL: f64 = 0.0005;
const Q_VEL: f64 = 0.01;

const P0_POS: f64 = 1.0;
const P0_VEL: f64 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Step used to build the transition and control matrices [s].
    pub time_step: f64,
    /// Minimum det(S) / prod(diag(S)) accepted before inverting S.
    pub singular_tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            time_step: TIME_DELTA,
            singular_tolerance: 1e-12,
        }
    }
}

/// The constant matrices of the process and measurement models.
#[derive(Clone, Debug, PartialEq)]
pub struct KalmanModel {
    /// A
    pub transition: StateMat,
    /// B
    pub control: ControlMat,
    /// Q
    pub process_noise: StateMat,
    /// H
    pub measurement: MeasurementMat,
    /// R
    pub measurement_noise: PositionNoise,
    /// P0
    pub initial_covariance: StateMat,
}

impl KalmanModel {
    /// Model with the tuned noise values and `TIME_DELTA`.
    pub fn standard() -> Self {
        Self::from_time_step(TIME_DELTA)
    }

    /// Constant-acceleration kinematics for step `dt`; noise terms and the
    /// initial covariance do not depend on `dt`.
    pub fn from_time_step(dt: f64) -> Self {
        let mut transition = StateMat::identity();
        let mut control = ControlMat::zeros();
        for axis in 0..3 {
            transition[(axis, axis + 3)] = dt;
            control[(axis, axis)] = 0.5 * dt * dt;
            control[(axis + 3, axis)] = dt;
        }

        let mut measurement = MeasurementMat::zeros();
        for axis in 0..3 {
            measurement[(axis, axis)] = 1.0;
        }

        Self {
            transition,
            control,
            process_noise: Self::process_noise(),
            measurement,
            measurement_noise: Self::measurement_noise(),
            initial_covariance: Self::initial_covariance(),
        }
    }

    fn process_noise() -> StateMat {
        let mut q = StateMat::zeros();
        for axis in 0..3 {
            q[(axis, axis)] = Q_POS;
            q[(axis, axis + 3)] = Q_POS_VEL;
            q[(axis + 3, axis)] = Q_POS_VEL;
            q[(axis + 3, axis + 3)] = Q_VEL;
        }
        q
    }

    // Row-major; symmetric.
    fn measurement_noise() -> PositionNoise {
        PositionNoise::new(
            0.005, 0.0023, 0.0018, //
            0.0023, 0.0137, 0.0036, //
            0.0018, 0.0036, 0.029,
        )
    }

    fn initial_covariance() -> StateMat {
        StateMat::from_diagonal(&StateVec::from_column_slice(&[
            P0_POS, P0_POS, P0_POS, P0_VEL, P0_VEL, P0_VEL,
        ]))
    }
}

impl Default for KalmanModel {
    fn default() -> Self {
        Self::standard()
    }
}

/// Read-only copy of the estimator's mean and covariance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    pub state: StateVec,
    pub covariance: StateMat,
}

impl KalmanState {
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.state[0], self.state[1], self.state[2])
    }

    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.state[3], self.state[4], self.state[5])
    }

    pub fn location(&self) -> LocationData {
        LocationData::new(self.state[0], self.state[1], self.state[2])
    }

    /// RMS of the position variances [m].
    pub fn position_uncertainty(&self) -> f64 {
        let trace = self.covariance[(0, 0)] + self.covariance[(1, 1)] + self.covariance[(2, 2)];
        (trace / 3.0).max(0.0).sqrt()
    }

    pub fn covariance_trace(&self) -> f64 {
        self.covariance.trace()
    }

    pub fn is_finite(&self) -> bool {
        self.state.iter().all(|v| v.is_finite()) && self.covariance.iter().all(|v| v.is_finite())
    }
}

pub struct KalmanEstimator {
    model: KalmanModel,
    singular_tolerance: f64,
    state: StateVec,
    covariance: StateMat,
    predict_count: u64,
    correct_count: u64,
    rejected_count: u64,
}

impl KalmanEstimator {
    /// Filter over the standard model, seeded at `initial` with zero velocity.
    pub fn configure(initial: LocationData) -> PResult<Self> {
        Self::configure_with(&EstimatorConfig::default(), initial)
    }

    pub fn configure_with(config: &EstimatorConfig, initial: LocationData) -> PResult<Self> {
        if !config.time_step.is_finite() || config.time_step <= 0.0 {
            return Err(PositioningError::InvalidParameters(format!(
                "time step must be positive and finite, got {}",
                config.time_step
            )));
        }
        if !config.singular_tolerance.is_finite() || config.singular_tolerance < 0.0 {
            return Err(PositioningError::InvalidParameters(format!(
                "singular tolerance must be non-negative and finite, got {}",
                config.singular_tolerance
            )));
        }
        let mut estimator = Self::with_model(initial, KalmanModel::from_time_step(config.time_step))?;
        estimator.singular_tolerance = config.singular_tolerance;
        Ok(estimator)
    }

    pub fn with_model(initial: LocationData, model: KalmanModel) -> PResult<Self> {
        if !initial.is_finite() {
            return Err(PositioningError::InvalidLocation(format!(
                "({}, {}, {})",
                initial.x, initial.y, initial.z
            )));
        }

        let state = StateVec::from_column_slice(&[initial.x, initial.y, initial.z, 0.0, 0.0, 0.0]);
        let covariance = model.initial_covariance;

        debug!(
            "estimator configured at ({:.3}, {:.3}, {:.3})",
            initial.x, initial.y, initial.z
        );

        Ok(Self {
            model,
            singular_tolerance: EstimatorConfig::default().singular_tolerance,
            state,
            covariance,
            predict_count: 0,
            correct_count: 0,
            rejected_count: 0,
        })
    }

    /// Advance one step with `control` as the acceleration input.
    pub fn predict(&mut self, control: Vector3<f64>) {
        let a = &self.model.transition;
        let u = ControlVec::new(control.x, control.y, control.z);

        self.state = a * self.state + self.model.control * u;
        self.covariance = a * self.covariance * a.transpose() + self.model.process_noise;
        self.predict_count += 1;
    }

    /// Fold in a position fix. On failure the predicted state is kept.
    pub fn correct(&mut self, measurement: Vector3<f64>) -> PResult<()> {
        if !measurement.iter().all(|v| v.is_finite()) {
            self.rejected_count += 1;
            let err = PositioningError::InvalidMeasurement(format!(
                "({}, {}, {})",
                measurement.x, measurement.y, measurement.z
            ));
            warn!("correction skipped, keeping predicted state: {}", err);
            return Err(err);
        }

        match self.compute_correction(&measurement) {
            Ok((state, covariance)) => {
                self.state = state;
                self.covariance = covariance;
                self.correct_count += 1;
                Ok(())
            }
            Err(err) => {
                self.rejected_count += 1;
                warn!("correction skipped, keeping predicted state: {}", err);
                Err(err)
            }
        }
    }

    fn compute_correction(&self, z: &PositionVec) -> PResult<(StateVec, StateMat)> {
        let h = &self.model.measurement;
        let p = &self.covariance;
        let h_t = h.transpose();

        let s = h * p * h_t + self.model.measurement_noise;
        let determinant = s.determinant();
        if !self.is_invertible(&s, determinant) {
            return Err(PositioningError::SingularInnovation { determinant });
        }
        let s_inv = s
            .try_inverse()
            .ok_or(PositioningError::SingularInnovation { determinant })?;

        let k: KalmanGainPos = p * h_t * s_inv;
        let innovation = z - h * self.state;
        let state = self.state + k * innovation;
        let covariance = (StateMat::identity() - k * h) * p;

        let finite = state.iter().all(|v| v.is_finite()) && covariance.iter().all(|v| v.is_finite());
        if !finite {
            return Err(PositioningError::SingularInnovation { determinant });
        }
        Ok((state, covariance))
    }

    fn is_invertible(&self, s: &PositionNoise, determinant: f64) -> bool {
        if !determinant.is_finite() {
            return false;
        }
        let diag_product: f64 = s.diagonal().iter().product();
        if !(diag_product.is_finite() && diag_product > 0.0) {
            return false;
        }
        determinant / diag_product > self.singular_tolerance
    }

    pub fn current_state(&self) -> KalmanState {
        KalmanState {
            state: self.state,
            covariance: self.covariance,
        }
    }

    pub fn model(&self) -> &KalmanModel {
        &self.model
    }

    pub fn predict_count(&self) -> u64 {
        self.predict_count
    }

    pub fn correct_count(&self) -> u64 {
        self.correct_count
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }
}
