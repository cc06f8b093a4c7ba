// Positioning core
// Gravity separation and Kalman fusion of accelerometer samples with
// absolute position fixes.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod filters;
pub mod motion;
pub mod pipeline;
pub mod replay;
pub mod session_log;
pub mod types;
pub mod worker;

pub use config::PipelineConfig;
pub use error::{PResult, PositioningError};
pub use filters::{KalmanEstimator, KalmanState};
pub use motion::{MotionCue, MotionPreprocessor};
pub use pipeline::{PipelineOutput, PipelineSnapshot, PositioningPipeline};
pub use types::{AccelerometerData, LocationData, RawAccelerationSample};
pub use worker::{PipelineWorker, WorkerHandle};
