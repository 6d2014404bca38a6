//! Error types for config loading

/// Result type alias for config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config file not found
    #[error("config file not found: {0}")]
    NotFound(String),

    /// Malformed or invalid config (bad YAML/JSON, unsupported schema
    /// version, unsafe path)
    #[error("config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
