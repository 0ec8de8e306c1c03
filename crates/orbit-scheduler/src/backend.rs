use chrono::{DateTime, Utc};
use orbit_store::scheduling;
use orbit_store::{Deployment, RunSpec, StoreError};
use rusqlite::Connection;

/// Produces the runs a deployment is due for inside a window.
///
/// Implementations must be deterministic for a given window so that
/// overlapping passes produce the same idempotency keys.
pub trait RunGenerator {
    fn generate_due_runs(
        &self,
        conn: &Connection,
        deployment: &Deployment,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<RunSpec>, StoreError>;
}

/// Persists candidate runs, silently skipping ones that already exist.
/// Returns the subset that was actually inserted.
pub trait RunInserter {
    fn insert_runs(&self, conn: &Connection, runs: &[RunSpec]) -> Result<Vec<RunSpec>, StoreError>;
}

impl<T: RunGenerator + ?Sized> RunGenerator for &T {
    fn generate_due_runs(
        &self,
        conn: &Connection,
        deployment: &Deployment,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<RunSpec>, StoreError> {
        (**self).generate_due_runs(conn, deployment, window_start, window_end, max_count)
    }
}

impl<T: RunInserter + ?Sized> RunInserter for &T {
    fn insert_runs(&self, conn: &Connection, runs: &[RunSpec]) -> Result<Vec<RunSpec>, StoreError> {
        (**self).insert_runs(conn, runs)
    }
}

/// Generation from the deployment's own schedule, insertion into
/// `flow_runs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreBackend;

impl RunGenerator for StoreBackend {
    fn generate_due_runs(
        &self,
        _conn: &Connection,
        deployment: &Deployment,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<RunSpec>, StoreError> {
        scheduling::generate_scheduled_flow_runs(deployment, window_start, window_end, max_count)
    }
}

impl RunInserter for StoreBackend {
    fn insert_runs(&self, conn: &Connection, runs: &[RunSpec]) -> Result<Vec<RunSpec>, StoreError> {
        scheduling::insert_scheduled_flow_runs(conn, runs)
    }
}
