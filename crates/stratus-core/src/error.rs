//! Error types for core grid and pyramid operations

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (bad rectangle, out-of-range zoom or tile index)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
