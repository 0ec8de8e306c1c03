//! `orbit-store`: SQLite persistence for flows, deployments, flow runs and
//! task runs.
//!
//! Repository modules expose plain functions over a `&Connection` so callers
//! can compose them inside their own transaction (the schedule materializer
//! does). [`Store`] wraps a connection in a mutex and adds the deployment
//! management operations that span several tables.
//!
//! List and count functions take a [`orbit_filters::FilterCriteria`]; the
//! compiled predicate is rendered to SQL and combined with the function's
//! own ordering and paging.

pub mod db;
pub mod deployments;
pub mod error;
pub mod flow_runs;
pub mod flows;
pub mod models;
pub mod scheduling;
pub mod store;
pub mod task_runs;

mod query;
mod row;

pub use error::{Result, StoreError};
pub use models::{
    Deployment, DeploymentCreate, Flow, FlowCreate, FlowRun, FlowRunCreate, RunSpec, TaskRun,
    TaskRunCreate, AUTO_SCHEDULED_TAG,
};
pub use store::{Store, StoreSettings};
