//! `orbit-scheduler`: materializes future flow runs from deployment
//! schedules.
//!
//! # Overview
//!
//! The [`Materializer`] walks all deployments whose schedule is active in
//! ascending-id pages, asks a [`RunGenerator`] for the runs each one is due
//! for inside `[now, now + max_scheduled_time]`, and hands them to a
//! [`RunInserter`] in bounded chunks. The whole pass is one transaction;
//! insertion is idempotent, so overlapping passes never duplicate a run.
//!
//! [`SchedulerService`] drives passes on a fixed cadence until shutdown.
//!
//! | Setting                  | Default  |
//! |--------------------------|----------|
//! | `loop_seconds`           | 60       |
//! | `deployment_batch_size`  | 100      |
//! | `max_runs`               | 100      |
//! | `max_scheduled_time`     | 100 days |
//! | `insert_batch_size`      | 500      |

pub mod backend;
pub mod error;
pub mod materializer;
pub mod service;

pub use backend::{RunGenerator, RunInserter, StoreBackend};
pub use error::{Result, SchedulerError};
pub use materializer::{MaterializeReport, Materializer, MaterializerSettings};
pub use service::SchedulerService;
