//! Incremental propagation and reconciliation wired to SQLite and a mock
//! calendar service.

mod support;

use std::sync::Arc;
use std::time::Duration;

use calsync_core::{
    derive_aggregates, AggregateRepository, CoordinatorPorts, RunControl, ScheduleRepository,
    SyncRunCoordinator,
};
use calsync_domain::{CourseDatePair, DayPeriod, RunStatus};
use calsync_infra::database::{
    SqliteAggregateRepository, SqliteBindingRepository, SqliteMappingRepository,
    SqliteRosterRepository, SqliteScheduleRepository,
};
use calsync_infra::http::HttpClient;
use calsync_infra::integrations::calendar::{CalendarApiClient, CalendarBindingGateway};
use serde_json::json;
use support::{date, record, TestDatabase, TERM};
use wiremock::matchers::{body_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    db: TestDatabase,
    schedules: Arc<SqliteScheduleRepository>,
    aggregates: Arc<SqliteAggregateRepository>,
    coordinator: SyncRunCoordinator,
}

impl Harness {
    fn new(server: &MockServer) -> Self {
        let db = TestDatabase::new();
        let http = HttpClient::builder()
            .max_attempts(1)
            .base_backoff(Duration::ZERO)
            .build()
            .expect("http client should build");
        let client = Arc::new(
            CalendarApiClient::new(http, &format!("{}/api/v1", server.uri()))
                .expect("valid base url"),
        );

        let schedules = Arc::new(SqliteScheduleRepository::new(Arc::clone(&db.manager)));
        let aggregates = Arc::new(SqliteAggregateRepository::new(Arc::clone(&db.manager)));
        let coordinator = SyncRunCoordinator::new(CoordinatorPorts {
            schedules: schedules.clone(),
            aggregates: aggregates.clone(),
            rosters: Arc::new(SqliteRosterRepository::new(Arc::clone(&db.manager))),
            bindings: Arc::new(CalendarBindingGateway::new(
                Arc::new(SqliteBindingRepository::new(Arc::clone(&db.manager))),
                Arc::clone(&client),
            )),
            mappings: Arc::new(SqliteMappingRepository::new(Arc::clone(&db.manager))),
            grants: client,
        });

        Self { db, schedules, aggregates, coordinator }
    }

    /// CS101 changed on 2025-03-01 (morning and afternoon sessions by t-1,
    /// three students, three live bindings); MA201 is already propagated.
    async fn seed_scenario_a(&self) {
        self.db.add_course("CS101");
        self.db.add_teacher("CS101", "t-1");
        for student in ["s-1", "s-2", "s-3"] {
            self.db.enroll_student("CS101", student);
        }
        self.db.map_calendar("CS101", "cal-cs101");

        for row in [
            record("CS101", "2025-03-01", "08:00", "09:40", "t-1"),
            record("CS101", "2025-03-01", "14:00", "15:40", "t-1"),
            record("MA201", "2025-03-02", "08:00", "09:40", "t-9"),
        ] {
            self.schedules.record_upstream_change(row).await.unwrap();
        }
        let previous = derive_aggregates(&self.schedules.find_term_records(TERM).await.unwrap());
        self.aggregates.upsert_aggregates(&previous).await.unwrap();
        self.db.execute_batch(
            "UPDATE schedule_records SET marker = 'soft_delete_done' WHERE course_code = 'MA201';",
        );

        self.db.add_binding("CS101", "2025-03-01", "t-1", "teacher", "evt-t1");
        self.db.add_binding("CS101", "2025-03-01", "s-1", "student", "evt-s1");
        self.db.add_binding("CS101", "2025-03-01", "s-2", "student", "evt-s2");
    }
}

async fn accept_event_deletes(server: &MockServer, expected: u64) {
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/api/v1/calendars/[^/]+/events/[^/]+$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn incremental_sync_propagates_changed_pairs() {
    let server = MockServer::start().await;
    accept_event_deletes(&server, 3).await;
    let harness = Harness::new(&server);
    harness.seed_scenario_a().await;

    let stats = harness
        .coordinator
        .start_incremental_sync(TERM, None, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.processed_courses, 1);
    assert_eq!(stats.soft_deleted_aggregates, 2);
    assert_eq!(stats.deleted_teacher_calendars, 1);
    assert_eq!(stats.deleted_student_calendars, 2);
    assert_eq!(stats.new_aggregates, 2);
    assert!(stats.error.is_none());

    let db = &harness.db;
    assert_eq!(db.count("SELECT COUNT(*) FROM schedule_records WHERE marker != 'soft_delete_done'"), 0);
    assert_eq!(db.count("SELECT COUNT(*) FROM calendar_bindings WHERE deleted_at IS NULL"), 0);
    assert_eq!(harness.aggregates.find_live(TERM).await.unwrap().len(), 3);

    // Nothing left to do on the next pass
    let again = harness
        .coordinator
        .start_incremental_sync(TERM, None, &RunControl::new())
        .await
        .unwrap();
    assert_eq!(again.status, RunStatus::Completed);
    assert_eq!(again.processed_courses, 0);
    assert_eq!(again.new_aggregates, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_pairs_are_resumed() {
    let server = MockServer::start().await;
    accept_event_deletes(&server, 3).await;
    let harness = Harness::new(&server);
    harness.seed_scenario_a().await;

    // A previous run invalidated the pair and stopped before removal
    let pair = CourseDatePair::new("CS101", date("2025-03-01"));
    harness.aggregates.soft_delete_for_pair(TERM, &pair).await.unwrap();

    let stats = harness
        .coordinator
        .start_incremental_sync(TERM, None, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.processed_courses, 1);
    assert_eq!(stats.soft_deleted_aggregates, 0);
    assert_eq!(stats.deleted_teacher_calendars + stats.deleted_student_calendars, 3);
    assert!(harness.schedules.find_pending_pairs(TERM).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_run_leaves_markers_untouched() {
    let server = MockServer::start().await;
    accept_event_deletes(&server, 0).await;
    let harness = Harness::new(&server);
    harness.seed_scenario_a().await;

    let control = RunControl::new();
    control.cancel();
    let stats = harness.coordinator.start_incremental_sync(TERM, None, &control).await.unwrap();

    assert_eq!(stats.status, RunStatus::Cancelled);
    assert_eq!(harness.schedules.find_unpropagated_pairs(TERM).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_all_converges_course_calendars() {
    let server = MockServer::start().await;
    let harness = Harness::new(&server);
    harness.seed_scenario_a().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/calendars/cal-cs101/grants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "g-t1", "userId": "t-1", "role": "writer"},
                {"id": "g-old", "userId": "s-old", "role": "reader"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/calendars/cal-cs101/grants:batchCreate"))
        .and(body_json(json!({
            "grants": [
                {"userId": "s-1", "role": "reader"},
                {"userId": "s-2", "role": "reader"},
                {"userId": "s-3", "role": "reader"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/calendars/cal-cs101/grants/g-old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let results = harness.coordinator.reconcile_all(&RunControl::new()).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.course_code, "CS101");
    assert_eq!(result.added_count, 3);
    assert_eq!(result.removed_count, 1);
    assert_eq!(result.failed_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn course_without_roster_is_reported_without_calls() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let harness = Harness::new(&server);
    harness.db.add_course("EMPTY1");
    harness.db.map_calendar("EMPTY1", "cal-empty");

    let mapping = harness.coordinator.resolve_mapping("EMPTY1").await.unwrap();
    let result = harness.coordinator.sync_course(&mapping.course_code, &mapping.calendar_id).await;

    assert!(!result.success);
    assert_eq!(result.added_count + result.removed_count, 0);
    assert!(!result.errors.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn relocated_rows_retire_the_old_session() {
    let server = MockServer::start().await;
    accept_event_deletes(&server, 4).await;
    let harness = Harness::new(&server);
    harness.seed_scenario_a().await;
    let control = RunControl::new();
    harness.coordinator.start_incremental_sync(TERM, None, &control).await.unwrap();

    // s-3 was given an entry for the original date after the first pass
    harness.db.add_binding("CS101", "2025-03-01", "s-3", "student", "evt-s3");
    let old_id = harness.db.count(
        "SELECT id FROM schedule_records WHERE course_code = 'CS101' AND start_time = '14:00'",
    );
    let mut moved = record("CS101", "2025-03-05", "14:00", "15:40", "t-1");
    moved.id = old_id;
    let new_id = harness.schedules.record_upstream_change(moved).await.unwrap();
    assert_ne!(new_id, old_id);

    let mut pairs = harness.schedules.find_unpropagated_pairs(TERM).await.unwrap();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            CourseDatePair::new("CS101", date("2025-03-01")),
            CourseDatePair::new("CS101", date("2025-03-05")),
        ]
    );

    let stats = harness.coordinator.start_incremental_sync(TERM, None, &control).await.unwrap();

    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.processed_courses, 1);
    assert_eq!(stats.soft_deleted_aggregates, 2);
    assert_eq!(stats.deleted_student_calendars, 1);
    assert_eq!(stats.new_aggregates, 2);

    let live: Vec<_> = harness
        .aggregates
        .find_live(TERM)
        .await
        .unwrap()
        .into_iter()
        .map(|aggregate| (aggregate.course_code, aggregate.session_date, aggregate.period))
        .collect();
    assert_eq!(
        live,
        vec![
            ("CS101".to_string(), date("2025-03-01"), DayPeriod::Morning),
            ("CS101".to_string(), date("2025-03-05"), DayPeriod::Afternoon),
            ("MA201".to_string(), date("2025-03-02"), DayPeriod::Morning),
        ]
    );
    assert_eq!(
        harness.db.count(&format!("SELECT is_deleted FROM schedule_records WHERE id = {old_id}")),
        1
    );
    assert_eq!(harness.db.count("SELECT COUNT(*) FROM calendar_bindings WHERE deleted_at IS NULL"), 0);
}
