use orbit_filters::sql;
use orbit_filters::Predicate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};

use crate::error::Result;

/// `SELECT columns FROM table WHERE predicate ORDER BY order_by LIMIT/OFFSET`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn select<T>(
    conn: &Connection,
    columns: &str,
    table: &str,
    predicate: &Predicate,
    order_by: &str,
    offset: usize,
    limit: Option<usize>,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let filter = sql::render(predicate);
    let mut params = filter.params;
    // LIMIT -1 means "no limit" in SQLite.
    params.push(SqlValue::Integer(limit.map_or(-1, |l| l as i64)));
    params.push(SqlValue::Integer(offset as i64));
    let query = format!(
        "SELECT {columns} FROM {table} WHERE {} ORDER BY {order_by} LIMIT ? OFFSET ?",
        filter.sql
    );
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), map)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn count(conn: &Connection, table: &str, predicate: &Predicate) -> Result<u64> {
    let filter = sql::render(predicate);
    let query = format!("SELECT COUNT(*) FROM {table} WHERE {}", filter.sql);
    let n: i64 = conn.query_row(&query, params_from_iter(filter.params.iter()), |row| {
        row.get(0)
    })?;
    Ok(n as u64)
}
