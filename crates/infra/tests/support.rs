#![allow(dead_code)]

use std::sync::Arc;

use calsync_domain::{PropagationMarker, ScheduleRecord};
use calsync_infra::database::DbManager;
use chrono::{NaiveDate, NaiveTime};
use tempfile::TempDir;

pub const TERM: &str = "2024-2025-2";

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Fresh database with the schema applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("calsync-test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.manager.get_connection().expect("connection should be available");
        conn.query_row(sql, [], |row| row.get(0)).expect("count query should succeed")
    }

    pub fn add_course(&self, course_code: &str) {
        self.execute_batch(&format!(
            "INSERT INTO courses (course_code, term, course_name) VALUES ('{course_code}', '{TERM}', '{course_code}');"
        ));
    }

    pub fn add_teacher(&self, course_code: &str, user_id: &str) {
        self.execute_batch(&format!(
            "INSERT OR IGNORE INTO teachers (user_id, display_name) VALUES ('{user_id}', 'Teacher {user_id}');
             INSERT INTO course_teachers (course_code, user_id) VALUES ('{course_code}', '{user_id}');"
        ));
    }

    pub fn enroll_student(&self, course_code: &str, user_id: &str) {
        self.execute_batch(&format!(
            "INSERT OR IGNORE INTO students (user_id, display_name) VALUES ('{user_id}', 'Student {user_id}');
             INSERT INTO course_students (course_code, user_id) VALUES ('{course_code}', '{user_id}');"
        ));
    }

    pub fn map_calendar(&self, course_code: &str, calendar_id: &str) {
        self.execute_batch(&format!(
            "INSERT INTO calendar_mappings (course_code, term, calendar_id)
             VALUES ('{course_code}', '{TERM}', '{calendar_id}');"
        ));
    }

    pub fn add_binding(&self, course_code: &str, date: &str, user_id: &str, role: &str, event_id: &str) {
        self.execute_batch(&format!(
            "INSERT INTO calendar_bindings
                (user_id, role, course_code, term, session_date, calendar_id, external_event_id)
             VALUES ('{user_id}', '{role}', '{course_code}', '{TERM}', '{date}', 'personal-{user_id}', '{event_id}');"
        ));
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
}

pub fn time(raw: &str) -> NaiveTime {
    NaiveTime::parse_from_str(raw, "%H:%M").expect("valid time")
}

/// New upstream row (id 0 inserts)
pub fn record(course_code: &str, day: &str, start: &str, end: &str, teacher: &str) -> ScheduleRecord {
    ScheduleRecord {
        id: 0,
        course_code: course_code.to_string(),
        term: TERM.to_string(),
        session_date: date(day),
        start_time: time(start),
        end_time: time(end),
        room: Some(format!("R-{course_code}")),
        teacher_id: Some(teacher.to_string()),
        is_deleted: false,
        marker: PropagationMarker::Unpropagated,
    }
}
