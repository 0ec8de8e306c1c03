use orbit_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a scheduling pass. Any of them rolls the pass back.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Opening or committing the pass transaction failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The run generator failed for one deployment.
    #[error("Run generation failed for deployment {deployment_id}: {source}")]
    Generation {
        deployment_id: Uuid,
        #[source]
        source: StoreError,
    },

    /// Shutdown was requested while the pass was in progress.
    #[error("Scheduling pass cancelled")]
    Cancelled,

    /// The blocking task running the pass panicked or was aborted.
    #[error("Scheduling task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
