use thiserror::Error;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A browser reply that does not match the reply schema.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// The remote source refused or lost a request.
    #[error("Source error: {0}")]
    Source(String),

    /// The log sink could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedReply(err.to_string())
    }
}
