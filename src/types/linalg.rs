//! Linear algebra type system for the position estimator
//!
//! Fixed-size aliases keep every Kalman product dimension-checked at
//! compile time.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 6; // (px, py, pz, vx, vy, vz)

// ===== Control / Measurement Dimensions =====
pub const CONTROL_DIM: usize = 3; // (ax, ay, az)
pub const MEASURE_DIM_POS: usize = 3; // (x, y, z)

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Control input
pub type ControlVec = SVector<f64, CONTROL_DIM>;
pub type ControlMat = SMatrix<f64, STATE_DIM, CONTROL_DIM>; // 6×3

// Position measurement
pub type PositionVec = SVector<f64, MEASURE_DIM_POS>;
pub type PositionNoise = SMatrix<f64, MEASURE_DIM_POS, MEASURE_DIM_POS>; // 3×3
pub type MeasurementMat = SMatrix<f64, MEASURE_DIM_POS, STATE_DIM>; // 3×6

// Kalman gain
pub type KalmanGainPos = SMatrix<f64, STATE_DIM, MEASURE_DIM_POS>; // 6×3
