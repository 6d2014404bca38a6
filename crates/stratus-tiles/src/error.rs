//! Error types for tile rendering and scheduling

/// Result type alias for tile operations
pub type Result<T> = std::result::Result<T, Error>;

/// Tile error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (bad opacity, unknown variable, malformed color)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend failure while writing tiles
    #[error("storage error: {0}")]
    Storage(String),

    /// Cube error
    #[error(transparent)]
    Cube(#[from] stratus_cube::Error),

    /// Pyramid/projection error
    #[error(transparent)]
    Core(#[from] stratus_core::Error),

    /// Config error
    #[error(transparent)]
    Config(#[from] stratus_config::Error),

    /// Image encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

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

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }
}
