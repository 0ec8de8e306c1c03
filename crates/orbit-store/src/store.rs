use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use orbit_core::{OrbitConfig, StateType};
use orbit_filters::FilterCriteria;
use rusqlite::Connection;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::deployments;
use crate::error::{Result, StoreError};
use crate::flow_runs;
use crate::flows;
use crate::models::*;
use crate::scheduling;
use crate::task_runs;

/// Limits applied by the management operations.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Most runs a single scheduling call creates for one deployment.
    pub max_runs: usize,
    /// Default scheduling horizon, measured from "now".
    pub max_scheduled_time: Duration,
    /// Upper bound on the page size of every `read_*` list.
    pub default_limit: usize,
}

impl StoreSettings {
    pub fn from_config(config: &OrbitConfig) -> Self {
        Self {
            max_runs: config.scheduler.max_runs,
            max_scheduled_time: config.scheduler.max_scheduled_time(),
            default_limit: config.api.default_limit,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from_config(&OrbitConfig::default())
    }
}

/// Thread-safe handle over one SQLite connection.
///
/// Plain reads and writes delegate to the repository functions; operations
/// that touch several tables run inside one transaction.
pub struct Store {
    db: Mutex<Connection>,
    settings: StoreSettings,
}

impl Store {
    pub fn new(conn: Connection, settings: StoreSettings) -> Self {
        Self {
            db: Mutex::new(conn),
            settings,
        }
    }

    /// Exclusive access to the connection, e.g. for a scheduling pass.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn clamp(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.settings.default_limit)
            .min(self.settings.default_limit)
    }

    // --- flows -------------------------------------------------------------

    pub fn create_flow(&self, flow: &FlowCreate) -> Result<Flow> {
        flows::create_flow(&*self.lock()?, flow)
    }

    pub fn read_flow(&self, id: Uuid) -> Result<Flow> {
        flows::read_flow(&*self.lock()?, id)
    }

    pub fn read_flows(
        &self,
        criteria: &FilterCriteria,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Flow>> {
        flows::read_flows(&*self.lock()?, criteria, offset, self.clamp(limit))
    }

    pub fn count_flows(&self, criteria: &FilterCriteria) -> Result<u64> {
        flows::count_flows(&*self.lock()?, criteria)
    }

    // --- deployments -------------------------------------------------------

    /// Create or replace the deployment named `deployment.name` for its flow.
    ///
    /// Runs auto-scheduled from the previous configuration that have not
    /// started are removed, then runs are scheduled from the new one when
    /// its schedule is active.
    #[instrument(skip(self, deployment), fields(name = %deployment.name))]
    pub fn create_deployment(&self, deployment: &DeploymentCreate) -> Result<Deployment> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stored = deployments::upsert_deployment(&tx, deployment)?;
        deployments::delete_auto_scheduled_runs(&tx, stored.id)?;
        if stored.is_schedule_active && stored.schedule.is_some() {
            self.schedule_in(&tx, &stored, None, None, None)?;
        }
        tx.commit()?;
        info!(deployment_id = %stored.id, "deployment created");
        Ok(stored)
    }

    pub fn read_deployment(&self, id: Uuid) -> Result<Deployment> {
        deployments::read_deployment(&*self.lock()?, id)
    }

    pub fn read_deployment_by_name(&self, flow_name: &str, name: &str) -> Result<Deployment> {
        deployments::read_deployment_by_name(&*self.lock()?, flow_name, name)
    }

    /// Deployments matching `criteria` ordered by name; `limit` is capped at
    /// the configured default limit.
    pub fn read_deployments(
        &self,
        criteria: &FilterCriteria,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Deployment>> {
        deployments::read_deployments(&*self.lock()?, criteria, offset, self.clamp(limit))
    }

    pub fn count_deployments(&self, criteria: &FilterCriteria) -> Result<u64> {
        deployments::count_deployments(&*self.lock()?, criteria)
    }

    pub fn delete_deployment(&self, id: Uuid) -> Result<()> {
        deployments::delete_deployment(&*self.lock()?, id)
    }

    /// Schedule runs for one deployment, regardless of whether its schedule
    /// is active. Unset arguments default to now, now plus the configured
    /// horizon, and the configured per-deployment maximum.
    #[instrument(skip(self))]
    pub fn schedule_runs(
        &self,
        id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        max_runs: Option<usize>,
    ) -> Result<Vec<RunSpec>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deployment = deployments::read_deployment(&tx, id)?;
        let inserted = self.schedule_in(&tx, &deployment, start, end, max_runs)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Turn the schedule on and schedule runs from it right away.
    pub fn set_schedule_active(&self, id: Uuid) -> Result<Deployment> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deployment = deployments::set_schedule_active_flag(&tx, id, true)?;
        if deployment.schedule.is_some() {
            self.schedule_in(&tx, &deployment, None, None, None)?;
        }
        tx.commit()?;
        Ok(deployment)
    }

    /// Turn the schedule off and drop the runs it produced that have not
    /// started yet.
    pub fn set_schedule_inactive(&self, id: Uuid) -> Result<Deployment> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deployment = deployments::set_schedule_active_flag(&tx, id, false)?;
        deployments::delete_auto_scheduled_runs(&tx, id)?;
        tx.commit()?;
        Ok(deployment)
    }

    fn schedule_in(
        &self,
        conn: &Connection,
        deployment: &Deployment,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        max_runs: Option<usize>,
    ) -> Result<Vec<RunSpec>> {
        let start = start.unwrap_or_else(Utc::now);
        let end = end.unwrap_or(start + self.settings.max_scheduled_time);
        let max_runs = max_runs.unwrap_or(self.settings.max_runs);
        let runs = scheduling::generate_scheduled_flow_runs(deployment, start, end, max_runs)?;
        let inserted = scheduling::insert_scheduled_flow_runs(conn, &runs)?;
        info!(
            deployment_id = %deployment.id,
            inserted = inserted.len(),
            "scheduled runs"
        );
        Ok(inserted)
    }

    // --- flow runs ---------------------------------------------------------

    pub fn create_flow_run(&self, run: &FlowRunCreate) -> Result<FlowRun> {
        flow_runs::create_flow_run(&*self.lock()?, run)
    }

    pub fn read_flow_run(&self, id: Uuid) -> Result<FlowRun> {
        flow_runs::read_flow_run(&*self.lock()?, id)
    }

    pub fn read_flow_runs(
        &self,
        criteria: &FilterCriteria,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<FlowRun>> {
        flow_runs::read_flow_runs(&*self.lock()?, criteria, offset, self.clamp(limit))
    }

    pub fn count_flow_runs(&self, criteria: &FilterCriteria) -> Result<u64> {
        flow_runs::count_flow_runs(&*self.lock()?, criteria)
    }

    pub fn set_flow_run_state(
        &self,
        id: Uuid,
        state_type: StateType,
        state_name: Option<&str>,
    ) -> Result<FlowRun> {
        flow_runs::set_flow_run_state(&*self.lock()?, id, state_type, state_name, Utc::now())
    }

    // --- task runs ---------------------------------------------------------

    pub fn create_task_run(&self, run: &TaskRunCreate) -> Result<TaskRun> {
        task_runs::create_task_run(&*self.lock()?, run)
    }

    pub fn read_task_run(&self, id: Uuid) -> Result<TaskRun> {
        task_runs::read_task_run(&*self.lock()?, id)
    }

    pub fn read_task_runs(
        &self,
        criteria: &FilterCriteria,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<TaskRun>> {
        task_runs::read_task_runs(&*self.lock()?, criteria, offset, self.clamp(limit))
    }

    pub fn count_task_runs(&self, criteria: &FilterCriteria) -> Result<u64> {
        task_runs::count_task_runs(&*self.lock()?, criteria)
    }
}
