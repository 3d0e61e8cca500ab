//! SQLite-backed course-to-calendar mappings.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::CalendarMappingRepository;
use calsync_domain::{CourseMapping, Result};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;

use super::columns::now_text;
use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqliteMappingRepository {
    db: Arc<DbManager>,
}

impl SqliteMappingRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Bind a course offering to a calendar, replacing any live mapping.
    pub async fn save_mapping(&self, mapping: CourseMapping) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            let now = now_text();
            tx.execute(RETIRE_MAPPING_SQL, params![mapping.course_code, mapping.term, now])
                .map_err(map_sql_error)?;
            tx.execute(
                INSERT_MAPPING_SQL,
                params![mapping.course_code, mapping.term, mapping.calendar_id, now],
            )
            .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl CalendarMappingRepository for SqliteMappingRepository {
    async fn find_valid_mappings(&self) -> Result<Vec<CourseMapping>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<CourseMapping>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(VALID_MAPPINGS_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_mapping_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_mapping(&self, course_code: &str) -> Result<Option<CourseMapping>> {
        let db = Arc::clone(&self.db);
        let course_code = course_code.to_string();

        task::spawn_blocking(move || -> Result<Option<CourseMapping>> {
            let conn = db.get_connection()?;
            conn.query_row(COURSE_MAPPING_SQL, params![course_code], map_mapping_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const VALID_MAPPINGS_SQL: &str = "SELECT m.course_code, m.term, m.calendar_id
    FROM calendar_mappings m
    JOIN courses c ON c.course_code = m.course_code
    WHERE m.deleted_at IS NULL AND c.deleted_at IS NULL AND c.is_active = 1
    ORDER BY m.course_code, m.term";

const COURSE_MAPPING_SQL: &str = "SELECT m.course_code, m.term, m.calendar_id
    FROM calendar_mappings m
    JOIN courses c ON c.course_code = m.course_code
    WHERE m.course_code = ?1
      AND m.deleted_at IS NULL AND c.deleted_at IS NULL AND c.is_active = 1
    ORDER BY m.term DESC
    LIMIT 1";

const RETIRE_MAPPING_SQL: &str = "UPDATE calendar_mappings SET deleted_at = ?3
    WHERE course_code = ?1 AND term = ?2 AND deleted_at IS NULL";

const INSERT_MAPPING_SQL: &str = "INSERT INTO calendar_mappings
        (course_code, term, calendar_id, created_at)
    VALUES (?1, ?2, ?3, ?4)";

fn map_mapping_row(row: &Row<'_>) -> rusqlite::Result<CourseMapping> {
    Ok(CourseMapping { course_code: row.get(0)?, term: row.get(1)?, calendar_id: row.get(2)? })
}
