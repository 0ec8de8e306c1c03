use chrono::Utc;
use orbit_core::{format_ts, new_id, StateType};
use orbit_filters::{columns, sql, DeploymentFilter, Equals, Filter, FilterCriteria, Predicate};
use orbit_filters::{CompareOp, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Deployment, DeploymentCreate};
use crate::query;
use crate::row;

const COLUMNS: &str = "deployments.id, deployments.flow_id, deployments.name, \
     deployments.schedule, deployments.is_schedule_active, deployments.tags, \
     deployments.parameters, deployments.created, deployments.updated";

fn deployment_from_row(r: &Row<'_>) -> rusqlite::Result<Deployment> {
    Ok(Deployment {
        id: row::uuid(r, 0)?,
        flow_id: row::uuid(r, 1)?,
        name: r.get(2)?,
        schedule: row::opt_json(r, 3)?,
        is_schedule_active: r.get(4)?,
        tags: row::json(r, 5)?,
        parameters: row::json(r, 6)?,
        created: row::ts(r, 7)?,
        updated: row::ts(r, 8)?,
    })
}

/// Insert a deployment, or update the one with the same `(flow_id, name)`.
///
/// Returns the stored row; its id is the existing one on update.
#[instrument(skip(conn, deployment), fields(flow_id = %deployment.flow_id, name = %deployment.name))]
pub fn upsert_deployment(conn: &Connection, deployment: &DeploymentCreate) -> Result<Deployment> {
    if let Some(schedule) = &deployment.schedule {
        schedule.validate()?;
    }
    let schedule = deployment
        .schedule
        .as_ref()
        .map(row::to_json)
        .transpose()?;
    let now = format_ts(Utc::now());
    let id: String = conn.query_row(
        "INSERT INTO deployments
         (id, flow_id, name, schedule, is_schedule_active, tags, parameters, created, updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(flow_id, name) DO UPDATE SET
            schedule = excluded.schedule,
            is_schedule_active = excluded.is_schedule_active,
            tags = excluded.tags,
            parameters = excluded.parameters,
            updated = excluded.updated
         RETURNING id",
        params![
            new_id().to_string(),
            deployment.flow_id.to_string(),
            deployment.name,
            schedule,
            deployment.is_schedule_active,
            row::to_json(&deployment.tags)?,
            row::to_json(&deployment.parameters)?,
            now,
        ],
        |r| r.get(0),
    )?;
    debug!(deployment_id = %id, "deployment upserted");
    read_deployment_by_key(conn, &id)
}

fn read_deployment_by_key(conn: &Connection, id: &str) -> Result<Deployment> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM deployments WHERE deployments.id = ?1"),
        [id],
        deployment_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("deployment", id))
}

pub fn read_deployment(conn: &Connection, id: Uuid) -> Result<Deployment> {
    read_deployment_by_key(conn, &id.to_string())
}

/// Look a deployment up by its flow's name and its own name.
pub fn read_deployment_by_name(
    conn: &Connection,
    flow_name: &str,
    name: &str,
) -> Result<Deployment> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM deployments
             JOIN flows ON flows.id = deployments.flow_id
             WHERE flows.name = ?1 AND deployments.name = ?2"
        ),
        [flow_name, name],
        deployment_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("deployment", format!("{flow_name}/{name}")))
}

/// Deployments matching `criteria`, ordered by name.
pub fn read_deployments(
    conn: &Connection,
    criteria: &FilterCriteria,
    offset: usize,
    limit: usize,
) -> Result<Vec<Deployment>> {
    query::select(
        conn,
        COLUMNS,
        columns::deployments::TABLE,
        &criteria.for_deployments(),
        "deployments.name, deployments.id",
        offset,
        Some(limit),
        deployment_from_row,
    )
}

pub fn count_deployments(conn: &Connection, criteria: &FilterCriteria) -> Result<u64> {
    query::count(conn, columns::deployments::TABLE, &criteria.for_deployments())
}

#[instrument(skip(conn))]
pub fn delete_deployment(conn: &Connection, id: Uuid) -> Result<()> {
    let n = conn.execute("DELETE FROM deployments WHERE id = ?1", [id.to_string()])?;
    if n == 0 {
        return Err(StoreError::not_found("deployment", id));
    }
    info!("deployment deleted");
    Ok(())
}

/// Flip `is_schedule_active`. Returns the updated row.
#[instrument(skip(conn))]
pub fn set_schedule_active_flag(conn: &Connection, id: Uuid, active: bool) -> Result<Deployment> {
    let n = conn.execute(
        "UPDATE deployments SET is_schedule_active = ?1, updated = ?2 WHERE id = ?3",
        params![active, format_ts(Utc::now()), id.to_string()],
    )?;
    if n == 0 {
        return Err(StoreError::not_found("deployment", id));
    }
    read_deployment(conn, id)
}

/// Remove runs the materializer created for `deployment_id` that have not
/// left the SCHEDULED state. Returns how many were deleted.
#[instrument(skip(conn))]
pub fn delete_auto_scheduled_runs(conn: &Connection, deployment_id: Uuid) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM flow_runs
         WHERE deployment_id = ?1 AND auto_scheduled = 1 AND state_type = ?2",
        params![deployment_id.to_string(), StateType::Scheduled.as_str()],
    )?;
    if n > 0 {
        debug!(count = n, "auto-scheduled runs removed");
    }
    Ok(n)
}

/// One page of deployments the materializer should look at: schedule
/// active and present, ascending id, strictly after `after` when given.
pub fn read_schedulable_page(
    conn: &Connection,
    after: Option<Uuid>,
    limit: usize,
) -> Result<Vec<Deployment>> {
    let active = DeploymentFilter {
        is_schedule_active: Some(Equals::new(true)),
        ..Default::default()
    };
    let cursor = after.map_or(Predicate::True, |id| Predicate::Compare {
        column: columns::deployments::ID,
        op: CompareOp::Gt,
        value: Value::from(id),
    });
    let predicate = Predicate::and([
        active.predicate(),
        Predicate::IsNotNull(columns::deployments::SCHEDULE),
        cursor,
    ]);
    let filter = sql::render(&predicate);
    let mut params = filter.params;
    params.push(rusqlite::types::Value::Integer(limit as i64));

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM deployments WHERE {} ORDER BY deployments.id LIMIT ?",
        filter.sql
    ))?;
    let page = stmt
        .query_map(params_from_iter(params.iter()), deployment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(page)
}
