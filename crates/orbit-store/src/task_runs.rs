use chrono::Utc;
use orbit_core::{format_ts, new_id};
use orbit_filters::{columns, FilterCriteria};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{TaskRun, TaskRunCreate};
use crate::query;
use crate::row;

const COLUMNS: &str = "task_runs.id, task_runs.flow_run_id, task_runs.task_key, \
     task_runs.name, task_runs.tags, task_runs.state_type, task_runs.state_name, \
     task_runs.start_time, task_runs.created, task_runs.updated";

fn task_run_from_row(r: &Row<'_>) -> rusqlite::Result<TaskRun> {
    Ok(TaskRun {
        id: row::uuid(r, 0)?,
        flow_run_id: row::uuid(r, 1)?,
        task_key: r.get(2)?,
        name: r.get(3)?,
        tags: row::json(r, 4)?,
        state_type: row::opt_state(r, 5)?,
        state_name: r.get(6)?,
        start_time: row::opt_ts(r, 7)?,
        created: row::ts(r, 8)?,
        updated: row::ts(r, 9)?,
    })
}

#[instrument(skip(conn, run), fields(flow_run_id = %run.flow_run_id, task_key = %run.task_key))]
pub fn create_task_run(conn: &Connection, run: &TaskRunCreate) -> Result<TaskRun> {
    let id = new_id();
    let now = format_ts(Utc::now());
    let name = run.name.clone().unwrap_or_else(|| run.task_key.clone());
    let state_name = run
        .state_name
        .clone()
        .or_else(|| run.state_type.map(|t| t.default_name().to_string()));
    conn.execute(
        "INSERT INTO task_runs
         (id, flow_run_id, task_key, name, tags, state_type, state_name, start_time,
          created, updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id.to_string(),
            run.flow_run_id.to_string(),
            run.task_key,
            name,
            row::to_json(&run.tags)?,
            run.state_type.map(|t| t.as_str()),
            state_name,
            row::opt_ts_text(run.start_time),
            now,
        ],
    )?;
    read_task_run(conn, id)
}

pub fn read_task_run(conn: &Connection, id: Uuid) -> Result<TaskRun> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM task_runs WHERE task_runs.id = ?1"),
        [id.to_string()],
        task_run_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("task run", id))
}

/// Task runs matching `criteria`, oldest first.
pub fn read_task_runs(
    conn: &Connection,
    criteria: &FilterCriteria,
    offset: usize,
    limit: usize,
) -> Result<Vec<TaskRun>> {
    query::select(
        conn,
        COLUMNS,
        columns::task_runs::TABLE,
        &criteria.for_task_runs(),
        "task_runs.created, task_runs.id",
        offset,
        Some(limit),
        task_run_from_row,
    )
}

pub fn count_task_runs(conn: &Connection, criteria: &FilterCriteria) -> Result<u64> {
    query::count(conn, columns::task_runs::TABLE, &criteria.for_task_runs())
}
