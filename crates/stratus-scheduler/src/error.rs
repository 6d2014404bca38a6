//! Error types for scheduling operations

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid argument (bad cron expression, zero threshold)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown run id
    #[error("not found: {0}")]
    NotFound(String),

    /// Run-history persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Job failure, surfaced after the retry envelope is exhausted
    #[error("job failed: {0}")]
    Job(String),

    /// Webhook dispatch failure
    #[error("webhook error: {0}")]
    Webhook(String),

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

    /// Create a new job error
    pub fn job<S: Into<String>>(msg: S) -> Self {
        Error::Job(msg.into())
    }
}
