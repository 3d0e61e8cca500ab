//! SQLite-backed read access to timetable source rows.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_common::storage::SqliteConnection;
use calsync_core::ScheduleRepository;
use calsync_domain::{CourseDatePair, PropagationMarker, Result, ScheduleRecord};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, warn};

use super::columns::{
    date_column, format_date, format_time, int_to_bool, now_text, time_column,
};
use super::manager::{map_join_error, map_sql_error, DbManager};

/// Reads `schedule_records` for change detection and regeneration.
pub struct SqliteScheduleRepository {
    db: Arc<DbManager>,
}

impl SqliteScheduleRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Upstream ingestion entry point. New and edited rows enter the
    /// pipeline as `unpropagated`.
    ///
    /// An edit that moves a row to another course, term or date tombstones
    /// the old row and inserts a new one, so both pairs are detected and the
    /// old pair's aggregates and bindings are retired.
    pub async fn record_upstream_change(&self, record: ScheduleRecord) -> Result<i64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<i64> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let session_date = format_date(record.session_date);
            let start_time = format_time(record.start_time);
            let end_time = format_time(record.end_time);
            let now = now_text();

            let existing: Option<(String, String, String)> = if record.id > 0 {
                tx.query_row(RECORD_PAIR_SQL, params![record.id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .optional()
                .map_err(map_sql_error)?
            } else {
                None
            };

            let id = match existing {
                Some((course_code, term, date))
                    if course_code == record.course_code
                        && term == record.term
                        && date == session_date =>
                {
                    tx.execute(
                        UPDATE_RECORD_SQL,
                        params![
                            start_time,
                            end_time,
                            record.room,
                            record.teacher_id,
                            record.is_deleted,
                            now,
                            record.id,
                        ],
                    )
                    .map_err(map_sql_error)?;
                    record.id
                }
                moved => {
                    if let Some((course_code, _, date)) = moved {
                        tx.execute(TOMBSTONE_RECORD_SQL, params![now, record.id])
                            .map_err(map_sql_error)?;
                        debug!(
                            row_id = record.id,
                            from_course = %course_code,
                            from_date = %date,
                            to_course = %record.course_code,
                            to_date = %session_date,
                            "schedule row relocated"
                        );
                    }
                    tx.execute(
                        INSERT_RECORD_SQL,
                        params![
                            record.course_code,
                            record.term,
                            session_date,
                            start_time,
                            end_time,
                            record.room,
                            record.teacher_id,
                            record.is_deleted,
                            now,
                        ],
                    )
                    .map_err(map_sql_error)?;
                    tx.last_insert_rowid()
                }
            };

            tx.commit().map_err(map_sql_error)?;
            Ok(id)
        })
        .await
        .map_err(map_join_error)?
    }

    fn pairs_with_marker(
        conn: &SqliteConnection,
        term: &str,
        marker: PropagationMarker,
    ) -> Result<Vec<CourseDatePair>> {
        let mut stmt = conn.prepare(PAIRS_BY_MARKER_SQL).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![term, marker.as_str()], |row| {
                Ok(CourseDatePair::new(row.get::<_, String>(0)?, date_column(row, 1)?))
            })
            .map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn find_unpropagated_pairs(&self, term: &str) -> Result<Vec<CourseDatePair>> {
        let db = Arc::clone(&self.db);
        let term = term.to_string();

        task::spawn_blocking(move || -> Result<Vec<CourseDatePair>> {
            let conn = db.get_connection()?;
            Self::pairs_with_marker(&conn, &term, PropagationMarker::Unpropagated)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_pending_pairs(&self, term: &str) -> Result<Vec<CourseDatePair>> {
        let db = Arc::clone(&self.db);
        let term = term.to_string();

        task::spawn_blocking(move || -> Result<Vec<CourseDatePair>> {
            let conn = db.get_connection()?;
            Self::pairs_with_marker(&conn, &term, PropagationMarker::SoftDeletePending)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_term_records(&self, term: &str) -> Result<Vec<ScheduleRecord>> {
        let db = Arc::clone(&self.db);
        let term = term.to_string();

        task::spawn_blocking(move || -> Result<Vec<ScheduleRecord>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(TERM_RECORDS_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![term], map_record_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const PAIRS_BY_MARKER_SQL: &str = "SELECT DISTINCT course_code, session_date
    FROM schedule_records
    WHERE term = ?1 AND marker = ?2
    ORDER BY course_code, session_date";

const TERM_RECORDS_SQL: &str = "SELECT
        id, course_code, term, session_date, start_time, end_time, room, teacher_id,
        is_deleted, marker
    FROM schedule_records
    WHERE term = ?1
    ORDER BY course_code, session_date, start_time, id";

const INSERT_RECORD_SQL: &str = "INSERT INTO schedule_records (
        course_code, term, session_date, start_time, end_time, room, teacher_id, is_deleted,
        marker, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'unpropagated', ?9)";

const RECORD_PAIR_SQL: &str =
    "SELECT course_code, term, session_date FROM schedule_records WHERE id = ?1";

const UPDATE_RECORD_SQL: &str = "UPDATE schedule_records SET
        start_time = ?1, end_time = ?2, room = ?3, teacher_id = ?4, is_deleted = ?5,
        marker = 'unpropagated', updated_at = ?6
    WHERE id = ?7";

const TOMBSTONE_RECORD_SQL: &str = "UPDATE schedule_records
    SET is_deleted = 1, marker = 'unpropagated', updated_at = ?1
    WHERE id = ?2";

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<ScheduleRecord> {
    let id: i64 = row.get(0)?;
    let marker_raw: String = row.get(9)?;

    Ok(ScheduleRecord {
        id,
        course_code: row.get(1)?,
        term: row.get(2)?,
        session_date: date_column(row, 3)?,
        start_time: time_column(row, 4)?,
        end_time: time_column(row, 5)?,
        room: row.get(6)?,
        teacher_id: row.get(7)?,
        is_deleted: int_to_bool(row.get(8)?),
        marker: parse_marker(id, &marker_raw),
    })
}

/// Unknown markers read as `unpropagated`, which re-runs the pair.
pub(crate) fn parse_marker(id: i64, raw: &str) -> PropagationMarker {
    match raw.parse::<PropagationMarker>() {
        Ok(marker) => marker,
        Err(err) => {
            warn!(
                row_id = id,
                raw_marker = %raw,
                error = %err,
                "invalid propagation marker in database, treating as unpropagated"
            );
            PropagationMarker::Unpropagated
        }
    }
}
