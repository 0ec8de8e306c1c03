use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

/// Open (creating if needed) the database at `path` and initialise the schema.
pub fn open(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    prepare(&conn)?;
    Ok(conn)
}

/// Private in-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    init_db(conn)
}

/// Initialise the orchestration schema. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_flows_table(conn)?;
    create_deployments_table(conn)?;
    create_flow_runs_table(conn)?;
    create_task_runs_table(conn)?;
    Ok(())
}

fn create_flows_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS flows (
            id          TEXT NOT NULL PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            tags        TEXT NOT NULL DEFAULT '[]',   -- JSON array
            created     TEXT NOT NULL,
            updated     TEXT NOT NULL
        ) STRICT;",
    )?;
    Ok(())
}

/// `schedule` is the JSON-encoded `Schedule` or NULL; the partial index
/// serves the materializer's page query.
fn create_deployments_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS deployments (
            id                  TEXT    NOT NULL PRIMARY KEY,
            flow_id             TEXT    NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
            name                TEXT    NOT NULL,
            schedule            TEXT,
            is_schedule_active  INTEGER NOT NULL DEFAULT 1,
            tags                TEXT    NOT NULL DEFAULT '[]',
            parameters          TEXT    NOT NULL DEFAULT '{}',
            created             TEXT    NOT NULL,
            updated             TEXT    NOT NULL,
            UNIQUE(flow_id, name)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_deployments_schedulable
            ON deployments (id)
            WHERE is_schedule_active = 1 AND schedule IS NOT NULL;",
    )?;
    Ok(())
}

/// `(flow_id, idempotency_key)` is what makes repeated scheduling passes
/// harmless: a second insert for the same fire time is a conflict.
fn create_flow_runs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS flow_runs (
            id                          TEXT    NOT NULL PRIMARY KEY,
            flow_id                     TEXT    NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
            deployment_id               TEXT    REFERENCES deployments(id) ON DELETE SET NULL,
            name                        TEXT    NOT NULL,
            tags                        TEXT    NOT NULL DEFAULT '[]',
            flow_version                TEXT,
            parameters                  TEXT    NOT NULL DEFAULT '{}',
            idempotency_key             TEXT,
            auto_scheduled              INTEGER NOT NULL DEFAULT 0,
            parent_task_run_id          TEXT    REFERENCES task_runs(id) ON DELETE SET NULL,
            state_type                  TEXT,
            state_name                  TEXT,
            start_time                  TEXT,
            expected_start_time         TEXT,
            next_scheduled_start_time   TEXT,
            created                     TEXT    NOT NULL,
            updated                     TEXT    NOT NULL,
            UNIQUE(flow_id, idempotency_key)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_flow_runs_deployment
            ON flow_runs (deployment_id);
        CREATE INDEX IF NOT EXISTS idx_flow_runs_parent_task_run
            ON flow_runs (parent_task_run_id);
        CREATE INDEX IF NOT EXISTS idx_flow_runs_expected_start
            ON flow_runs (expected_start_time);",
    )?;
    Ok(())
}

fn create_task_runs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS task_runs (
            id              TEXT NOT NULL PRIMARY KEY,
            flow_run_id     TEXT NOT NULL REFERENCES flow_runs(id) ON DELETE CASCADE,
            task_key        TEXT NOT NULL,
            name            TEXT NOT NULL,
            tags            TEXT NOT NULL DEFAULT '[]',
            state_type      TEXT,
            state_name      TEXT,
            start_time      TEXT,
            created         TEXT NOT NULL,
            updated         TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_task_runs_flow_run
            ON task_runs (flow_run_id);",
    )?;
    Ok(())
}
