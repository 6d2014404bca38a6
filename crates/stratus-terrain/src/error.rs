//! Error types for terrain tile operations

/// Result type alias for terrain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Terrain error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (bad grid size, non-finite heights)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Grid unsuitable for quantized-mesh encoding
    #[error("encode error: {0}")]
    Encode(String),

    /// Pyramid math error
    #[error(transparent)]
    Core(#[from] stratus_core::Error),

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

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Error::Encode(msg.into())
    }
}
