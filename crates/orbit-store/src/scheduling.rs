//! Turning deployment schedules into persisted flow runs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use orbit_core::{format_ts, new_id, StateType};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Deployment, RunSpec, AUTO_SCHEDULED_TAG};
use crate::row;

/// Bound parameters per inserted row.
const INSERT_COLUMNS: usize = 14;
/// Rows per INSERT statement, keeping the statement under SQLite's
/// host-parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Key that identifies one fire time of one deployment across passes.
pub fn idempotency_key(deployment_id: Uuid, fire_time: DateTime<Utc>) -> String {
    format!("scheduled {deployment_id} {}", format_ts(fire_time))
}

/// Candidate runs for every fire time of `deployment` in `[start, end]`,
/// at most `max_runs` of them. A deployment without a schedule yields none.
#[instrument(skip(deployment), fields(deployment_id = %deployment.id))]
pub fn generate_scheduled_flow_runs(
    deployment: &Deployment,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_runs: usize,
) -> Result<Vec<RunSpec>> {
    let Some(schedule) = &deployment.schedule else {
        return Ok(Vec::new());
    };

    let mut tags = deployment.tags.clone();
    if !tags.iter().any(|t| t == AUTO_SCHEDULED_TAG) {
        tags.push(AUTO_SCHEDULED_TAG.to_string());
    }

    let runs: Vec<RunSpec> = schedule
        .fire_times(start, end, max_runs)?
        .into_iter()
        .map(|fire_time| RunSpec {
            id: new_id(),
            flow_id: deployment.flow_id,
            deployment_id: deployment.id,
            name: format!("{}-{}", deployment.name, fire_time.format("%Y%m%d-%H%M%S")),
            tags: tags.clone(),
            parameters: deployment.parameters.clone(),
            idempotency_key: idempotency_key(deployment.id, fire_time),
            state_type: StateType::Scheduled,
            state_name: StateType::Scheduled.default_name().to_string(),
            expected_start_time: fire_time,
            next_scheduled_start_time: fire_time,
            auto_scheduled: true,
        })
        .collect();
    debug!(count = runs.len(), "generated scheduled runs");
    Ok(runs)
}

/// Insert `runs`, skipping any whose `(flow_id, idempotency_key)` already
/// exists. Returns the runs that were actually inserted, in input order.
pub fn insert_scheduled_flow_runs(conn: &Connection, runs: &[RunSpec]) -> Result<Vec<RunSpec>> {
    let mut inserted = HashSet::with_capacity(runs.len());
    for chunk in runs.chunks(MAX_ROWS_PER_STATEMENT) {
        insert_chunk(conn, chunk, &mut inserted)?;
    }
    Ok(runs
        .iter()
        .filter(|run| inserted.contains(&run.id.to_string()))
        .cloned()
        .collect())
}

fn insert_chunk(conn: &Connection, chunk: &[RunSpec], inserted: &mut HashSet<String>) -> Result<()> {
    if chunk.is_empty() {
        return Ok(());
    }
    let now = format_ts(Utc::now());
    let row_marks = format!("({})", vec!["?"; INSERT_COLUMNS].join(", "));
    let sql = format!(
        "INSERT INTO flow_runs
         (id, flow_id, deployment_id, name, tags, parameters, idempotency_key,
          auto_scheduled, state_type, state_name, expected_start_time,
          next_scheduled_start_time, created, updated)
         VALUES {}
         ON CONFLICT(flow_id, idempotency_key) DO NOTHING
         RETURNING id",
        vec![row_marks.as_str(); chunk.len()].join(", ")
    );

    let mut params: Vec<SqlValue> = Vec::with_capacity(chunk.len() * INSERT_COLUMNS);
    for run in chunk {
        params.extend([
            SqlValue::Text(run.id.to_string()),
            SqlValue::Text(run.flow_id.to_string()),
            SqlValue::Text(run.deployment_id.to_string()),
            SqlValue::Text(run.name.clone()),
            SqlValue::Text(row::to_json(&run.tags)?),
            SqlValue::Text(row::to_json(&run.parameters)?),
            SqlValue::Text(run.idempotency_key.clone()),
            SqlValue::Integer(i64::from(run.auto_scheduled)),
            SqlValue::Text(run.state_type.as_str().to_string()),
            SqlValue::Text(run.state_name.clone()),
            SqlValue::Text(format_ts(run.expected_start_time)),
            SqlValue::Text(format_ts(run.next_scheduled_start_time)),
            SqlValue::Text(now.clone()),
            SqlValue::Text(now.clone()),
        ]);
    }

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt.query_map(params_from_iter(params.iter()), |r| r.get::<_, String>(0))?;
    for id in ids {
        inserted.insert(id?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use orbit_core::Schedule;

    fn deployment(schedule: Option<Schedule>) -> Deployment {
        let now = Utc::now();
        Deployment {
            id: new_id(),
            flow_id: new_id(),
            name: "nightly".into(),
            schedule,
            is_schedule_active: true,
            tags: vec!["prod".into()],
            parameters: serde_json::json!({"x": 1}),
            created: now,
            updated: now,
        }
    }

    #[test]
    fn unscheduled_deployment_yields_nothing() {
        let d = deployment(None);
        let start = Utc::now();
        let runs =
            generate_scheduled_flow_runs(&d, start, start + chrono::Duration::days(1), 10).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn runs_carry_deployment_fields_and_stable_keys() {
        let d = deployment(Some(Schedule::Interval {
            every_secs: 3600,
            anchor: None,
        }));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + chrono::Duration::hours(2);
        let runs = generate_scheduled_flow_runs(&d, start, end, 10).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].expected_start_time, start);
        assert_eq!(runs[0].name, "nightly-20240101-000000");
        assert_eq!(runs[0].tags, vec!["prod", AUTO_SCHEDULED_TAG]);
        assert_eq!(runs[0].state_type, StateType::Scheduled);
        assert_eq!(runs[0].parameters, serde_json::json!({"x": 1}));
        assert_eq!(
            runs[1].idempotency_key,
            idempotency_key(d.id, start + chrono::Duration::hours(1))
        );

        let again = generate_scheduled_flow_runs(&d, start, end, 10).unwrap();
        let keys: Vec<_> = again.iter().map(|r| &r.idempotency_key).collect();
        assert_eq!(keys, runs.iter().map(|r| &r.idempotency_key).collect::<Vec<_>>());
    }

    #[test]
    fn max_runs_caps_generation() {
        let d = deployment(Some(Schedule::Interval {
            every_secs: 60,
            anchor: None,
        }));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let runs =
            generate_scheduled_flow_runs(&d, start, start + chrono::Duration::days(1), 5).unwrap();
        assert_eq!(runs.len(), 5);
    }
}
