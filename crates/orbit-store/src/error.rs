use orbit_core::OrbitError;
use thiserror::Error;

/// Errors that can occur within the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No row with the given key exists.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The schedule attached to a deployment cannot be evaluated.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the connection.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<OrbitError> for StoreError {
    fn from(e: OrbitError) -> Self {
        match e {
            OrbitError::InvalidSchedule(msg) => StoreError::InvalidSchedule(msg),
            other => StoreError::Serialization(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
