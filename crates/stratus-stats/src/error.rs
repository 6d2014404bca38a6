//! Error types for statistics operations

/// Result type alias for statistics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Statistics error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (shape mismatch, out-of-range percentile, unsafe
    /// path component)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
