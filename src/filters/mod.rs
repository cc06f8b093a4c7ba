pub mod kalman;

pub use kalman::{EstimatorConfig, KalmanEstimator, KalmanModel, KalmanState, TIME_DELTA};
