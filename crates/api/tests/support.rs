#![allow(dead_code)]

use calsync_api::AppContext;
use calsync_domain::{CalendarApiConfig, Config, DatabaseConfig, LoggingConfig, SyncConfig};
use tempfile::TempDir;
use wiremock::MockServer;

pub const TERM: &str = "2024-2025-2";

/// Application context over a temporary database and a mock calendar service
pub struct TestApp {
    pub ctx: AppContext,
    pub server: MockServer,
    _temp_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().expect("temp dir should be created");

        let mut calendar = CalendarApiConfig::new(format!("{}/api/v1", server.uri()));
        calendar.max_attempts = 1;
        let config = Config {
            database: DatabaseConfig { path: temp_dir.path().join("calsync.db"), pool_size: 4 },
            calendar,
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        };

        let ctx = AppContext::new(config).await.expect("context should initialise");
        Self { ctx, server, _temp_dir: temp_dir }
    }

    pub fn execute_batch(&self, sql: &str) {
        let conn = self.ctx.db.get_connection().expect("connection should be available");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.ctx.db.get_connection().expect("connection should be available");
        conn.query_row(sql, [], |row| row.get(0)).expect("count query should succeed")
    }

    /// Course with one teacher, the given students and a calendar mapping
    pub fn seed_course(&self, course_code: &str, teacher: &str, students: &[&str], calendar_id: &str) {
        self.execute_batch(&format!(
            "INSERT INTO courses (course_code, term, course_name) VALUES ('{course_code}', '{TERM}', '{course_code}');
             INSERT OR IGNORE INTO teachers (user_id, display_name) VALUES ('{teacher}', 'Teacher {teacher}');
             INSERT INTO course_teachers (course_code, user_id) VALUES ('{course_code}', '{teacher}');
             INSERT INTO calendar_mappings (course_code, term, calendar_id) VALUES ('{course_code}', '{TERM}', '{calendar_id}');"
        ));
        for student in students {
            self.execute_batch(&format!(
                "INSERT OR IGNORE INTO students (user_id, display_name) VALUES ('{student}', 'Student {student}');
                 INSERT INTO course_students (course_code, user_id) VALUES ('{course_code}', '{student}');"
            ));
        }
    }

    /// Unpropagated upstream schedule row
    pub fn add_schedule_row(&self, course_code: &str, date: &str, start: &str, end: &str, teacher: &str) {
        self.execute_batch(&format!(
            "INSERT INTO schedule_records (course_code, term, session_date, start_time, end_time, room, teacher_id)
             VALUES ('{course_code}', '{TERM}', '{date}', '{start}', '{end}', 'R-{course_code}', '{teacher}');"
        ));
    }
}
