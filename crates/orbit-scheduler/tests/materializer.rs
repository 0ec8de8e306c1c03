use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use orbit_core::{new_id, Schedule, StateType};
use orbit_filters::FilterCriteria;
use orbit_scheduler::{
    MaterializeReport, Materializer, MaterializerSettings, RunGenerator, RunInserter,
    SchedulerError, SchedulerService, StoreBackend,
};
use orbit_store::db::open_in_memory;
use orbit_store::scheduling::idempotency_key;
use orbit_store::{
    deployments, flow_runs, flows, Deployment, DeploymentCreate, FlowCreate, RunSpec, Store,
    StoreError, StoreSettings,
};
use rusqlite::Connection;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap()
}

fn hourly() -> Schedule {
    Schedule::Interval {
        every_secs: 3600,
        anchor: None,
    }
}

fn settings(batch: usize, max_runs: usize, insert_batch: usize) -> MaterializerSettings {
    MaterializerSettings {
        deployment_batch_size: batch,
        max_runs,
        max_scheduled_time: Duration::days(100),
        insert_batch_size: insert_batch,
    }
}

/// A flow with `n` deployments, all with an active hourly schedule.
fn seed(conn: &Connection, n: usize) -> Vec<Uuid> {
    let flow = flows::create_flow(
        conn,
        &FlowCreate {
            name: "etl".into(),
            tags: Vec::new(),
        },
    )
    .unwrap();
    let mut ids: Vec<Uuid> = (0..n)
        .map(|i| {
            deployments::upsert_deployment(
                conn,
                &DeploymentCreate::new(flow.id, format!("d{i}")).with_schedule(hourly()),
            )
            .unwrap()
            .id
        })
        .collect();
    ids.sort();
    ids
}

fn run_count(conn: &Connection) -> u64 {
    flow_runs::count_flow_runs(conn, &FilterCriteria::default()).unwrap()
}

/// Store generator that remembers which deployments it was asked about.
#[derive(Default)]
struct Recording {
    seen: Mutex<Vec<Uuid>>,
}

impl RunGenerator for Recording {
    fn generate_due_runs(
        &self,
        conn: &Connection,
        deployment: &Deployment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max: usize,
    ) -> Result<Vec<RunSpec>, StoreError> {
        self.seen.lock().unwrap().push(deployment.id);
        StoreBackend.generate_due_runs(conn, deployment, start, end, max)
    }
}

/// Store inserter that remembers the size of every chunk.
#[derive(Default)]
struct Counting {
    chunks: Mutex<Vec<usize>>,
}

impl RunInserter for Counting {
    fn insert_runs(&self, conn: &Connection, runs: &[RunSpec]) -> Result<Vec<RunSpec>, StoreError> {
        self.chunks.lock().unwrap().push(runs.len());
        StoreBackend.insert_runs(conn, runs)
    }
}

/// Produces runs at fixed offsets from the window start.
struct FixedOffsets(Vec<Duration>);

impl RunGenerator for FixedOffsets {
    fn generate_due_runs(
        &self,
        _conn: &Connection,
        deployment: &Deployment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max: usize,
    ) -> Result<Vec<RunSpec>, StoreError> {
        Ok(self
            .0
            .iter()
            .map(|offset| start + *offset)
            .filter(|t| *t <= end)
            .take(max)
            .map(|t| RunSpec {
                id: new_id(),
                flow_id: deployment.flow_id,
                deployment_id: deployment.id,
                name: format!("{}-{}", deployment.name, t.timestamp()),
                tags: Vec::new(),
                parameters: serde_json::json!({}),
                idempotency_key: idempotency_key(deployment.id, t),
                state_type: StateType::Scheduled,
                state_name: "Scheduled".into(),
                expected_start_time: t,
                next_scheduled_start_time: t,
                auto_scheduled: true,
            })
            .collect())
    }
}

/// Fails for one deployment, delegates for the rest.
struct FailFor(Uuid);

impl RunGenerator for FailFor {
    fn generate_due_runs(
        &self,
        conn: &Connection,
        deployment: &Deployment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max: usize,
    ) -> Result<Vec<RunSpec>, StoreError> {
        if deployment.id == self.0 {
            return Err(StoreError::InvalidSchedule("boom".into()));
        }
        StoreBackend.generate_due_runs(conn, deployment, start, end, max)
    }
}

#[test]
fn seven_deployments_in_pages_of_three() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 7);
    let inserter = Counting::default();
    let m = Materializer::with_backends(settings(3, 1, 100), StoreBackend, &inserter);

    let report = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(
        report,
        MaterializeReport {
            pages: 3,
            deployments: 7,
            inserted: 7,
        }
    );
    // One insert per page, one run per deployment.
    assert_eq!(*inserter.chunks.lock().unwrap(), vec![3, 3, 1]);
}

#[test]
fn deployments_are_visited_once_in_ascending_id_order() {
    let mut conn = open_in_memory().unwrap();
    let ids = seed(&conn, 7);
    let generator = Recording::default();
    let m = Materializer::with_backends(settings(3, 1, 100), &generator, StoreBackend);
    m.run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(*generator.seen.lock().unwrap(), ids);
}

#[test]
fn exact_multiple_of_page_size_reads_ceil_pages() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 6);
    let m = Materializer::with_backends(settings(3, 1, 100), StoreBackend, StoreBackend);
    let report = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.deployments, 6);
}

#[test]
fn each_deployment_is_capped_at_max_runs() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 2);
    let m = Materializer::new(settings(10, 4, 100));
    let report = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(report.inserted, 8);
    assert_eq!(run_count(&conn), 8);
}

#[test]
fn second_pass_at_same_instant_inserts_nothing() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 3);
    let m = Materializer::new(settings(2, 5, 4));
    let cancel = AtomicBool::new(false);

    let first = m.run_once_at(&mut conn, now(), &cancel).unwrap();
    assert_eq!(first.inserted, 15);
    let second = m.run_once_at(&mut conn, now(), &cancel).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.deployments, 3);
    assert_eq!(run_count(&conn), 15);
}

#[test]
fn later_pass_only_adds_the_new_tail() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 1);
    let m = Materializer::new(settings(10, 3, 10));
    let cancel = AtomicBool::new(false);

    m.run_once_at(&mut conn, now(), &cancel).unwrap();
    let later = m
        .run_once_at(&mut conn, now() + Duration::hours(1), &cancel)
        .unwrap();
    // Fire times 01:00, 02:00, 03:00 then 02:00, 03:00, 04:00.
    assert_eq!(later.inserted, 1);
    assert_eq!(run_count(&conn), 4);
}

#[test]
fn two_candidates_with_insert_batch_of_one_take_two_calls() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 1);
    let inserter = Counting::default();
    let mut config = settings(100, 5, 1);
    config.max_scheduled_time = Duration::hours(3);
    let m = Materializer::with_backends(
        config,
        FixedOffsets(vec![Duration::hours(1), Duration::hours(2)]),
        &inserter,
    );

    let report = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(*inserter.chunks.lock().unwrap(), vec![1, 1]);
    assert_eq!(run_count(&conn), 2);
}

#[test]
fn insert_chunks_span_deployments_within_a_page() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 3);
    let inserter = Counting::default();
    let m = Materializer::with_backends(settings(10, 3, 4), StoreBackend, &inserter);
    let report = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(report.inserted, 9);
    assert_eq!(*inserter.chunks.lock().unwrap(), vec![4, 4, 1]);
}

#[test]
fn generator_failure_rolls_back_the_whole_pass() {
    let mut conn = open_in_memory().unwrap();
    let ids = seed(&conn, 3);
    let m = Materializer::with_backends(settings(1, 5, 100), FailFor(ids[2]), StoreBackend);

    let err = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap_err();
    match err {
        SchedulerError::Generation { deployment_id, .. } => assert_eq!(deployment_id, ids[2]),
        other => panic!("unexpected error: {other}"),
    }
    // Pages one and two were inserted before the failure; none survive.
    assert_eq!(run_count(&conn), 0);
}

#[test]
fn cancelled_pass_inserts_nothing() {
    let mut conn = open_in_memory().unwrap();
    seed(&conn, 2);
    let m = Materializer::new(settings(1, 5, 100));
    let err = m
        .run_once_at(&mut conn, now(), &AtomicBool::new(true))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Cancelled));
    assert_eq!(run_count(&conn), 0);
}

#[test]
fn inactive_and_unscheduled_deployments_are_skipped() {
    let mut conn = open_in_memory().unwrap();
    let flow = flows::create_flow(
        &conn,
        &FlowCreate {
            name: "etl".into(),
            tags: Vec::new(),
        },
    )
    .unwrap();
    deployments::upsert_deployment(
        &conn,
        &DeploymentCreate::new(flow.id, "paused")
            .with_schedule(hourly())
            .inactive(),
    )
    .unwrap();
    deployments::upsert_deployment(&conn, &DeploymentCreate::new(flow.id, "manual")).unwrap();

    let report = Materializer::new(settings(10, 5, 10))
        .run_once_at(&mut conn, now(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(report, MaterializeReport::default());
}

#[tokio::test]
async fn service_materializes_until_shutdown() {
    let conn = open_in_memory().unwrap();
    seed(&conn, 2);
    let store = Arc::new(Store::new(conn, StoreSettings::default()));
    let service = SchedulerService::with_materializer(
        Arc::clone(&store),
        Materializer::new(settings(10, 3, 10)),
        std::time::Duration::from_millis(20),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(service.run(shutdown_rx));

    let mut scheduled = 0;
    for _ in 0..100 {
        scheduled = store.count_flow_runs(&FilterCriteria::default()).unwrap();
        if scheduled > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(scheduled, 6);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("service did not stop")
        .unwrap();
}

#[tokio::test]
async fn service_stops_when_sender_is_dropped() {
    let store = Arc::new(Store::new(open_in_memory().unwrap(), StoreSettings::default()));
    let service = SchedulerService::with_materializer(
        store,
        Materializer::new(settings(10, 3, 10)),
        std::time::Duration::from_secs(3600),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(service.run(shutdown_rx));
    drop(shutdown_tx);
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("service did not stop")
        .unwrap();
}
