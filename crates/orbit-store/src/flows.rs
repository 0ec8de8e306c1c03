use chrono::Utc;
use orbit_core::{format_ts, new_id};
use orbit_filters::{columns, FilterCriteria};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Flow, FlowCreate};
use crate::query;
use crate::row;

const COLUMNS: &str = "flows.id, flows.name, flows.tags, flows.created, flows.updated";

fn flow_from_row(r: &Row<'_>) -> rusqlite::Result<Flow> {
    Ok(Flow {
        id: row::uuid(r, 0)?,
        name: r.get(1)?,
        tags: row::json(r, 2)?,
        created: row::ts(r, 3)?,
        updated: row::ts(r, 4)?,
    })
}

/// Create a flow, or return the existing one with the same name.
#[instrument(skip(conn, flow), fields(name = %flow.name))]
pub fn create_flow(conn: &Connection, flow: &FlowCreate) -> Result<Flow> {
    let now = format_ts(Utc::now());
    conn.execute(
        "INSERT INTO flows (id, name, tags, created, updated)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(name) DO NOTHING",
        params![new_id().to_string(), flow.name, row::to_json(&flow.tags)?, now],
    )?;
    debug!("flow upserted");
    read_flow_by_name(conn, &flow.name)
}

pub fn read_flow(conn: &Connection, id: Uuid) -> Result<Flow> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM flows WHERE flows.id = ?1"),
        [id.to_string()],
        flow_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("flow", id))
}

pub fn read_flow_by_name(conn: &Connection, name: &str) -> Result<Flow> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM flows WHERE flows.name = ?1"),
        [name],
        flow_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("flow", name))
}

/// Flows matching `criteria`, ordered by name.
pub fn read_flows(
    conn: &Connection,
    criteria: &FilterCriteria,
    offset: usize,
    limit: usize,
) -> Result<Vec<Flow>> {
    query::select(
        conn,
        COLUMNS,
        columns::flows::TABLE,
        &criteria.for_flows(),
        "flows.name",
        offset,
        Some(limit),
        flow_from_row,
    )
}

pub fn count_flows(conn: &Connection, criteria: &FilterCriteria) -> Result<u64> {
    query::count(conn, columns::flows::TABLE, &criteria.for_flows())
}

/// Delete a flow; its deployments and runs go with it.
pub fn delete_flow(conn: &Connection, id: Uuid) -> Result<()> {
    let n = conn.execute("DELETE FROM flows WHERE id = ?1", [id.to_string()])?;
    if n == 0 {
        return Err(StoreError::not_found("flow", id));
    }
    Ok(())
}
