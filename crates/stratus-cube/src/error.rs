//! Error types for cube operations

/// Result type alias for cube operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cube error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (mismatched grids, bad options)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cube lacks required dimensions, shapes or monotonic coordinates
    #[error("cube validation error: {0}")]
    Validation(String),

    /// Unparsable source file
    #[error("decode error: {0}")]
    Decode(String),

    /// Backend failure while reading or writing cubes
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Error::Decode(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }
}
