//! Error types for archive manifests

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Archive error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (unsafe manifest filename, bad directory)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Run directory or manifest not found
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }
}
