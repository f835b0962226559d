use thiserror::Error;

/// Failures of the settings store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be interpreted for its key
    #[error("Invalid value for setting {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub(crate) fn invalid(key: &'static str, message: impl ToString) -> Self {
        Self::InvalidValue {
            key,
            message: message.to_string(),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
