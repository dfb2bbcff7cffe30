//! Memory store errors.

/// Errors returned by [`crate::MemoryStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// `SQLite` failure.
    #[error("database error: {0}")]
    Database(String),

    /// Filesystem failure while opening the store.
    #[error("IO error: {0}")]
    Io(String),

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The blocking worker running the query panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),

    /// The backend refused the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
