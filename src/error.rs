use thiserror::Error;

/// Positioning core error types
#[derive(Error, Debug)]
pub enum PositioningError {
    #[error("Invalid initial location: {0}")]
    InvalidLocation(String),

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("Innovation covariance is singular (det = {determinant:e})")]
    SingularInnovation { determinant: f64 },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Processing queue closed")]
    QueueClosed,

    #[error("Worker thread panicked")]
    WorkerPanicked,

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl PositioningError {
    /// True for errors after which the pipeline keeps running unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PositioningError::SingularInnovation { .. } | PositioningError::InvalidMeasurement(_)
        )
    }
}

/// Result type for positioning operations
pub type PResult<T> = Result<T, PositioningError>;
