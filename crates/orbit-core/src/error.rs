use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrbitError {
    /// Short, stable error code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            OrbitError::Config(_) => "CONFIG_ERROR",
            OrbitError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            OrbitError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            OrbitError::Serialization(_) => "SERIALIZATION_ERROR",
            OrbitError::Io(_) => "IO_ERROR",
            OrbitError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrbitError>;
