//! Filter criteria evaluated by SQLite against real rows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use orbit_core::StateType;
use orbit_filters::{
    AnyOf, DeploymentFilter, Exists, FilterCriteria, FlowFilter, FlowRunFilter, NullableAnyOf,
    StateFilter, TagSet, TaskRunFilter, TimeRange,
};
use orbit_store::db::open_in_memory;
use orbit_store::{
    deployments, flow_runs, flows, task_runs, DeploymentCreate, FlowCreate, FlowRunCreate,
    TaskRunCreate,
};
use rusqlite::Connection;
use uuid::Uuid;

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

fn flow(conn: &Connection, name: &str, tags: &[&str]) -> Uuid {
    flows::create_flow(
        conn,
        &FlowCreate {
            name: name.into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        },
    )
    .unwrap()
    .id
}

fn run(conn: &Connection, flow_id: Uuid, name: &str, tags: &[&str]) -> Uuid {
    let mut create = FlowRunCreate::new(flow_id);
    create.name = Some(name.into());
    create.tags = tags.iter().map(|s| s.to_string()).collect();
    flow_runs::create_flow_run(conn, &create).unwrap().id
}

fn flow_names(conn: &Connection, criteria: &FilterCriteria) -> Vec<String> {
    flows::read_flows(conn, criteria, 0, 100)
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect()
}

fn run_names(conn: &Connection, criteria: &FilterCriteria) -> Vec<String> {
    let mut names: Vec<_> = flow_runs::read_flow_runs(conn, criteria, 0, 100)
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    names
}

fn runs_where(filter: FlowRunFilter) -> FilterCriteria {
    FilterCriteria {
        flow_runs: Some(filter),
        ..Default::default()
    }
}

#[test]
fn empty_criteria_select_everything() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    run(&conn, f, "r1", &[]);
    run(&conn, f, "r2", &["x"]);

    assert_eq!(run_names(&conn, &FilterCriteria::default()), vec!["r1", "r2"]);
    let present_but_empty = FilterCriteria::from_json(
        r#"{"flows":{},"flow_runs":{"tags":{},"state":{}},"task_runs":{},"deployments":{}}"#,
    )
    .unwrap();
    assert_eq!(run_names(&conn, &present_but_empty), vec!["r1", "r2"]);
}

#[test]
fn tag_superset_selects_exactly_supersets() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    run(&conn, f, "ab", &["a", "b"]);
    run(&conn, f, "abc", &["c", "b", "a"]);
    run(&conn, f, "a", &["a"]);
    run(&conn, f, "none", &[]);

    let forward = runs_where(FlowRunFilter {
        tags: Some(TagSet::all(["a", "b"])),
        ..Default::default()
    });
    let shuffled = runs_where(FlowRunFilter {
        tags: Some(TagSet::all(["b", "a", "b"])),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &forward), vec!["ab", "abc"]);
    assert_eq!(run_names(&conn, &shuffled), vec!["ab", "abc"]);
}

#[test]
fn tag_null_check_splits_tagged_and_untagged() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    run(&conn, f, "tagged", &["a"]);
    run(&conn, f, "other", &["z"]);
    run(&conn, f, "untagged", &[]);

    let empty = runs_where(FlowRunFilter {
        tags: Some(TagSet::null_check(true)),
        ..Default::default()
    });
    let non_empty = runs_where(FlowRunFilter {
        tags: Some(TagSet::null_check(false)),
        ..Default::default()
    });
    let both = runs_where(FlowRunFilter {
        tags: Some(TagSet::all(["a"]).and_null_check(false)),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &empty), vec!["untagged"]);
    assert_eq!(run_names(&conn, &non_empty), vec!["other", "tagged"]);
    assert_eq!(run_names(&conn, &both), vec!["tagged"]);
}

#[test]
fn time_range_is_inclusive_on_both_ends() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    for (name, hour) in [("h1", 1), ("h2", 2), ("h3", 3), ("h4", 4)] {
        let mut create = FlowRunCreate::new(f);
        create.name = Some(name.into());
        create.expected_start_time = Some(t(hour));
        flow_runs::create_flow_run(&conn, &create).unwrap();
    }
    run(&conn, f, "unset", &[]);

    let window = runs_where(FlowRunFilter {
        expected_start_time: Some(TimeRange::between(t(2), t(3))),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &window), vec!["h2", "h3"]);

    let sub_second = runs_where(FlowRunFilter {
        expected_start_time: Some(TimeRange::after(t(3) + Duration::microseconds(1))),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &sub_second), vec!["h4"]);
}

#[test]
fn start_time_null_check() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    let started = run(&conn, f, "started", &[]);
    run(&conn, f, "waiting", &[]);
    flow_runs::set_flow_run_state(&conn, started, StateType::Running, None, t(5)).unwrap();

    let not_started = runs_where(FlowRunFilter {
        start_time: Some(TimeRange::null_check(true)),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &not_started), vec!["waiting"]);
}

#[test]
fn state_type_and_name_combine() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    let a = run(&conn, f, "late", &[]);
    let b = run(&conn, f, "scheduled", &[]);
    let c = run(&conn, f, "failed", &[]);
    flow_runs::set_flow_run_state(&conn, a, StateType::Scheduled, Some("Late"), t(1)).unwrap();
    flow_runs::set_flow_run_state(&conn, b, StateType::Scheduled, None, t(1)).unwrap();
    flow_runs::set_flow_run_state(&conn, c, StateType::Failed, None, t(1)).unwrap();

    let scheduled = runs_where(FlowRunFilter {
        state: Some(StateFilter {
            state_type: Some(AnyOf::any([StateType::Scheduled])),
            name: None,
        }),
        ..Default::default()
    });
    let late = runs_where(FlowRunFilter {
        state: Some(StateFilter {
            state_type: Some(AnyOf::any([StateType::Scheduled])),
            name: Some(AnyOf::any(["Late".to_string()])),
        }),
        ..Default::default()
    });
    let not_failed = runs_where(FlowRunFilter {
        state: Some(StateFilter {
            state_type: Some(AnyOf::not_any([StateType::Failed])),
            name: None,
        }),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &scheduled), vec!["late", "scheduled"]);
    assert_eq!(run_names(&conn, &late), vec!["late"]);
    assert_eq!(run_names(&conn, &not_failed), vec!["late", "scheduled"]);
}

#[test]
fn id_exclusion_and_deployment_null_check() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    let d = deployments::upsert_deployment(&conn, &DeploymentCreate::new(f, "nightly")).unwrap();
    let mut create = FlowRunCreate::new(f);
    create.name = Some("deployed".into());
    create.deployment_id = Some(d.id);
    let deployed = flow_runs::create_flow_run(&conn, &create).unwrap().id;
    run(&conn, f, "adhoc", &[]);

    let adhoc = runs_where(FlowRunFilter {
        deployment_id: Some(NullableAnyOf::null_check(true)),
        ..Default::default()
    });
    let not_deployed = runs_where(FlowRunFilter {
        id: Some(AnyOf::not_any([deployed])),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &adhoc), vec!["adhoc"]);
    assert_eq!(run_names(&conn, &not_deployed), vec!["adhoc"]);
}

#[test]
fn exclusion_keeps_rows_with_no_value() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    run(&conn, f, "bare", &[]);
    let mut create = FlowRunCreate::new(f);
    create.name = Some("v1-running".into());
    create.flow_version = Some("v1".into());
    create.state_type = Some(StateType::Running);
    create.state_name = Some("Running".into());
    flow_runs::create_flow_run(&conn, &create).unwrap();

    let not_v1 = runs_where(FlowRunFilter {
        flow_version: Some(AnyOf::not_any(["v1".to_string()])),
        ..Default::default()
    });
    let not_running = runs_where(FlowRunFilter {
        state: Some(StateFilter {
            state_type: Some(AnyOf::not_any([StateType::Running])),
            name: Some(AnyOf::not_any(["Running".to_string()])),
        }),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &not_v1), vec!["bare"]);
    assert_eq!(run_names(&conn, &not_running), vec!["bare"]);
    assert_eq!(flow_runs::count_flow_runs(&conn, &not_v1).unwrap(), 1);
}

#[test]
fn flows_selected_through_their_runs_and_deployments() {
    let conn = open_in_memory().unwrap();
    let etl = flow(&conn, "etl", &["db"]);
    let report = flow(&conn, "report", &[]);
    flow(&conn, "idle", &[]);
    run(&conn, etl, "etl-1", &["prod"]);
    run(&conn, report, "report-1", &["dev"]);
    deployments::upsert_deployment(&conn, &DeploymentCreate::new(report, "weekly")).unwrap();

    let with_prod_runs = FilterCriteria {
        flow_runs: Some(FlowRunFilter {
            tags: Some(TagSet::all(["prod"])),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(flow_names(&conn, &with_prod_runs), vec!["etl"]);

    let with_weekly = FilterCriteria {
        deployments: Some(DeploymentFilter {
            name: Some(AnyOf::any(["weekly".to_string()])),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(flow_names(&conn, &with_weekly), vec!["report"]);

    let tagged_db = FilterCriteria {
        flows: Some(FlowFilter {
            tags: Some(TagSet::all(["db"])),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(run_names(&conn, &tagged_db), vec!["etl-1"]);
}

#[test]
fn task_runs_with_and_without_subflows() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "parent", &[]);
    let parent_run = run(&conn, f, "parent-run", &[]);
    let spawner = task_runs::create_task_run(&conn, &TaskRunCreate::new(parent_run, "spawn"))
        .unwrap()
        .id;
    task_runs::create_task_run(&conn, &TaskRunCreate::new(parent_run, "plain")).unwrap();

    let mut child = FlowRunCreate::new(f);
    child.name = Some("child-run".into());
    child.parent_task_run_id = Some(spawner);
    flow_runs::create_flow_run(&conn, &child).unwrap();

    let keys = |exists: bool| -> Vec<String> {
        let criteria = FilterCriteria {
            task_runs: Some(TaskRunFilter {
                subflow_runs: Some(Exists::new(exists)),
                ..Default::default()
            }),
            ..Default::default()
        };
        task_runs::read_task_runs(&conn, &criteria, 0, 100)
            .unwrap()
            .into_iter()
            .map(|t| t.task_key)
            .collect()
    };
    assert_eq!(keys(true), vec!["spawn"]);
    assert_eq!(keys(false), vec!["plain"]);

    // Flow runs reached through a task run that spawned a subflow: only the
    // parent run owns such a task run.
    let criteria = FilterCriteria {
        task_runs: Some(TaskRunFilter {
            subflow_runs: Some(Exists::new(true)),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(run_names(&conn, &criteria), vec!["parent-run"]);

    let subflows = runs_where(FlowRunFilter {
        parent_task_run_id: Some(NullableAnyOf::null_check(false)),
        ..Default::default()
    });
    assert_eq!(run_names(&conn, &subflows), vec!["child-run"]);
}

#[test]
fn deployment_json_criteria_round_trip_through_sql() {
    let conn = open_in_memory().unwrap();
    let f = flow(&conn, "etl", &[]);
    deployments::upsert_deployment(
        &conn,
        &DeploymentCreate::new(f, "prod-nightly").with_tags(["prod"]),
    )
    .unwrap();
    deployments::upsert_deployment(&conn, &DeploymentCreate::new(f, "dev").inactive()).unwrap();

    let criteria = FilterCriteria::from_json(
        r#"{"deployments":{"is_schedule_active":{"eq_":true},"tags":{"all_":["prod"]}},
            "flows":{"name":{"any_":["etl"]}}}"#,
    )
    .unwrap();
    let found = deployments::read_deployments(&conn, &criteria, 0, 100).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "prod-nightly");
    assert_eq!(deployments::count_deployments(&conn, &criteria).unwrap(), 1);
}
