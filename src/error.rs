//! Error types for voxkan

use thiserror::Error;

/// Result type alias for voxkan operations
pub type Result<T> = std::result::Result<T, VoxkanError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum VoxkanError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    /// Clustering-guided oversampling found no usable cluster. Callers may retry.
    #[error("Oversampling error: {0}")]
    OversamplingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}

impl VoxkanError {
    /// Whether a clustering attempt may be retried with other parameters
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VoxkanError::OversamplingError(_))
    }
}

impl From<serde_json::Error> for VoxkanError {
    fn from(err: serde_json::Error) -> Self {
        VoxkanError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for VoxkanError {
    fn from(err: bincode::Error) -> Self {
        VoxkanError::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for VoxkanError {
    fn from(err: csv::Error) -> Self {
        VoxkanError::DataError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VoxkanError {
    fn from(err: ndarray::ShapeError) -> Self {
        VoxkanError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
