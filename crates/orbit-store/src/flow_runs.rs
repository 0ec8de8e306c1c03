use chrono::{DateTime, Utc};
use orbit_core::{format_ts, new_id, StateType};
use orbit_filters::{columns, FilterCriteria};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{FlowRun, FlowRunCreate};
use crate::query;
use crate::row;

const COLUMNS: &str = "flow_runs.id, flow_runs.flow_id, flow_runs.deployment_id, \
     flow_runs.name, flow_runs.tags, flow_runs.flow_version, flow_runs.parameters, \
     flow_runs.idempotency_key, flow_runs.auto_scheduled, flow_runs.parent_task_run_id, \
     flow_runs.state_type, flow_runs.state_name, flow_runs.start_time, \
     flow_runs.expected_start_time, flow_runs.next_scheduled_start_time, \
     flow_runs.created, flow_runs.updated";

fn flow_run_from_row(r: &Row<'_>) -> rusqlite::Result<FlowRun> {
    Ok(FlowRun {
        id: row::uuid(r, 0)?,
        flow_id: row::uuid(r, 1)?,
        deployment_id: row::opt_uuid(r, 2)?,
        name: r.get(3)?,
        tags: row::json(r, 4)?,
        flow_version: r.get(5)?,
        parameters: row::json(r, 6)?,
        idempotency_key: r.get(7)?,
        auto_scheduled: r.get(8)?,
        parent_task_run_id: row::opt_uuid(r, 9)?,
        state_type: row::opt_state(r, 10)?,
        state_name: r.get(11)?,
        start_time: row::opt_ts(r, 12)?,
        expected_start_time: row::opt_ts(r, 13)?,
        next_scheduled_start_time: row::opt_ts(r, 14)?,
        created: row::ts(r, 15)?,
        updated: row::ts(r, 16)?,
    })
}

/// Create a flow run.
///
/// When `idempotency_key` is set and a run with the same key already exists
/// for the flow, that run is returned and nothing is inserted.
#[instrument(skip(conn, run), fields(flow_id = %run.flow_id))]
pub fn create_flow_run(conn: &Connection, run: &FlowRunCreate) -> Result<FlowRun> {
    let id = new_id();
    let now = format_ts(Utc::now());
    let name = run.name.clone().unwrap_or_else(|| format!("run-{}", id.simple()));
    let state_name = run
        .state_name
        .clone()
        .or_else(|| run.state_type.map(|t| t.default_name().to_string()));
    let inserted = conn.execute(
        "INSERT INTO flow_runs
         (id, flow_id, deployment_id, name, tags, flow_version, parameters,
          idempotency_key, auto_scheduled, parent_task_run_id, state_type, state_name,
          start_time, expected_start_time, next_scheduled_start_time, created, updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?13, ?13, ?14, ?14)
         ON CONFLICT(flow_id, idempotency_key) DO NOTHING",
        params![
            id.to_string(),
            run.flow_id.to_string(),
            run.deployment_id.map(|d| d.to_string()),
            name,
            row::to_json(&run.tags)?,
            run.flow_version,
            row::to_json(&run.parameters)?,
            run.idempotency_key,
            run.parent_task_run_id.map(|t| t.to_string()),
            run.state_type.map(|t| t.as_str()),
            state_name,
            row::opt_ts_text(run.start_time),
            row::opt_ts_text(run.expected_start_time),
            now,
        ],
    )?;

    match (&run.idempotency_key, inserted) {
        (Some(key), 0) => {
            debug!(idempotency_key = %key, "flow run already exists");
            read_flow_run_by_key(conn, run.flow_id, key)
        }
        _ => read_flow_run(conn, id),
    }
}

pub fn read_flow_run(conn: &Connection, id: Uuid) -> Result<FlowRun> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM flow_runs WHERE flow_runs.id = ?1"),
        [id.to_string()],
        flow_run_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("flow run", id))
}

fn read_flow_run_by_key(conn: &Connection, flow_id: Uuid, key: &str) -> Result<FlowRun> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM flow_runs
             WHERE flow_runs.flow_id = ?1 AND flow_runs.idempotency_key = ?2"
        ),
        params![flow_id.to_string(), key],
        flow_run_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("flow run", key))
}

/// Flow runs matching `criteria`, soonest expected start first.
pub fn read_flow_runs(
    conn: &Connection,
    criteria: &FilterCriteria,
    offset: usize,
    limit: usize,
) -> Result<Vec<FlowRun>> {
    query::select(
        conn,
        COLUMNS,
        columns::flow_runs::TABLE,
        &criteria.for_flow_runs(),
        "flow_runs.expected_start_time, flow_runs.id",
        offset,
        Some(limit),
        flow_run_from_row,
    )
}

pub fn count_flow_runs(conn: &Connection, criteria: &FilterCriteria) -> Result<u64> {
    query::count(conn, columns::flow_runs::TABLE, &criteria.for_flow_runs())
}

/// Move a flow run to a new state. `start_time` is recorded the first time
/// the run enters RUNNING.
#[instrument(skip(conn))]
pub fn set_flow_run_state(
    conn: &Connection,
    id: Uuid,
    state_type: StateType,
    state_name: Option<&str>,
    at: DateTime<Utc>,
) -> Result<FlowRun> {
    let name = state_name.unwrap_or(state_type.default_name());
    let started = (state_type == StateType::Running).then(|| format_ts(at));
    let n = conn.execute(
        "UPDATE flow_runs
         SET state_type = ?1, state_name = ?2,
             start_time = COALESCE(start_time, ?3),
             updated = ?4
         WHERE id = ?5",
        params![
            state_type.as_str(),
            name,
            started,
            format_ts(Utc::now()),
            id.to_string()
        ],
    )?;
    if n == 0 {
        return Err(StoreError::not_found("flow run", id));
    }
    read_flow_run(conn, id)
}
