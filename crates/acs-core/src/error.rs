use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Domain parsing errors
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Unknown access state: {0}")]
    InvalidState(String),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // Soft runtime errors, logged and skipped by callers
    #[error("Lock not acquired within {0}ms")]
    LockTimeout(u64),

    #[error("Queue full or closed: {0}")]
    QueueFull(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the transient class of errors that callers log and skip.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::LockTimeout(_) | Error::QueueFull(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
