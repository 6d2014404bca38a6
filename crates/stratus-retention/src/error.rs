//! Error types for retention operations

/// Result type alias for retention operations
pub type Result<T> = std::result::Result<T, Error>;

/// Retention error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (bad root directory)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed references file
    #[error("references error: {0}")]
    References(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a new references error
    pub fn references<S: Into<String>>(msg: S) -> Self {
        Error::References(msg.into())
    }
}
