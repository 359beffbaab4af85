//! Error types for RustSTT.

use thiserror::Error;

/// Main error type for decoder operations.
#[derive(Error, Debug)]
pub enum SttError {
    /// Invalid hyperparameters at construction time.
    #[error("Config error: {0}")]
    Config(String),

    /// A tensor dimension invariant was violated.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Decoding errors.
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle tensor errors.
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for decoder operations.
pub type SttResult<T> = Result<T, SttError>;
