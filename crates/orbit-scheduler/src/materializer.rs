use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use orbit_core::SchedulerConfig;
use orbit_store::deployments::read_schedulable_page;
use rusqlite::Connection;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::backend::{RunGenerator, RunInserter, StoreBackend};
use crate::error::{Result, SchedulerError};

/// Limits for one scheduling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializerSettings {
    pub deployment_batch_size: usize,
    pub max_runs: usize,
    pub max_scheduled_time: Duration,
    pub insert_batch_size: usize,
}

impl MaterializerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            deployment_batch_size: config.deployment_batch_size,
            max_runs: config.max_runs,
            max_scheduled_time: config.max_scheduled_time(),
            insert_batch_size: config.insert_batch_size,
        }
    }
}

impl Default for MaterializerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Non-empty deployment pages read.
    pub pages: usize,
    /// Deployments handed to the generator.
    pub deployments: usize,
    /// Rows the inserter reported as new.
    pub inserted: usize,
}

/// Pages through every deployment with an active schedule and persists the
/// runs each one is due for within the horizon.
///
/// A pass runs in a single transaction: it commits only if every page was
/// generated and inserted, and rolls back on any error or on cancellation.
pub struct Materializer<G = StoreBackend, I = StoreBackend> {
    generator: G,
    inserter: I,
    settings: MaterializerSettings,
}

impl Materializer {
    pub fn new(settings: MaterializerSettings) -> Self {
        Self::with_backends(settings, StoreBackend, StoreBackend)
    }
}

impl<G: RunGenerator, I: RunInserter> Materializer<G, I> {
    pub fn with_backends(settings: MaterializerSettings, generator: G, inserter: I) -> Self {
        Self {
            generator,
            inserter,
            settings,
        }
    }

    pub fn settings(&self) -> &MaterializerSettings {
        &self.settings
    }

    pub fn run_once(&self, conn: &mut Connection, cancel: &AtomicBool) -> Result<MaterializeReport> {
        self.run_once_at(conn, Utc::now(), cancel)
    }

    /// One pass with the window `[now, now + max_scheduled_time]`.
    #[instrument(skip(self, conn, cancel))]
    pub fn run_once_at(
        &self,
        conn: &mut Connection,
        now: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> Result<MaterializeReport> {
        let page_size = self.settings.deployment_batch_size.max(1);
        let insert_size = self.settings.insert_batch_size.max(1);
        let end = now + self.settings.max_scheduled_time;

        let tx = conn.transaction()?;
        let mut report = MaterializeReport::default();
        let mut last_id: Option<Uuid> = None;

        loop {
            check_cancelled(cancel)?;
            let page = read_schedulable_page(&tx, last_id, page_size)?;
            if page.is_empty() {
                break;
            }
            report.pages += 1;

            let mut candidates = Vec::new();
            for deployment in &page {
                check_cancelled(cancel)?;
                let mut runs = self
                    .generator
                    .generate_due_runs(&tx, deployment, now, end, self.settings.max_runs)
                    .map_err(|source| SchedulerError::Generation {
                        deployment_id: deployment.id,
                        source,
                    })?;
                runs.truncate(self.settings.max_runs);
                candidates.append(&mut runs);
            }
            report.deployments += page.len();

            for chunk in candidates.chunks(insert_size) {
                report.inserted += self.inserter.insert_runs(&tx, chunk)?.len();
            }
            debug!(
                page = report.pages,
                deployments = page.len(),
                candidates = candidates.len(),
                "page processed"
            );

            if page.len() < page_size {
                break;
            }
            last_id = page.last().map(|d| d.id);
        }

        tx.commit()?;
        info!(
            inserted = report.inserted,
            deployments = report.deployments,
            pages = report.pages,
            "scheduled runs"
        );
        Ok(report)
    }
}

fn check_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        return Err(SchedulerError::Cancelled);
    }
    Ok(())
}
