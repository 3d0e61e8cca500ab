//! SQLite-backed aggregate materialization and propagation markers.
//!
//! Marker transitions for a pair run inside one transaction so aggregates and
//! their source rows never disagree about where the pair is in its lifecycle.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::AggregateRepository;
use calsync_domain::{CourseAggregate, CourseDatePair, DayPeriod, Result, SyncError};
use rusqlite::{params, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, warn};

use super::columns::{date_column, format_date, format_time, json_column, now_text, time_column};
use super::manager::{map_join_error, map_sql_error, DbManager};

/// Writes `course_aggregates` and advances markers on `schedule_records`.
pub struct SqliteAggregateRepository {
    db: Arc<DbManager>,
}

impl SqliteAggregateRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Live (not soft-deleted) aggregates of a term, ordered by natural key.
    pub async fn find_live(&self, term: &str) -> Result<Vec<CourseAggregate>> {
        let db = Arc::clone(&self.db);
        let term = term.to_string();

        task::spawn_blocking(move || -> Result<Vec<CourseAggregate>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(LIVE_AGGREGATES_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![term], map_aggregate_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl AggregateRepository for SqliteAggregateRepository {
    async fn soft_delete_for_pair(&self, term: &str, pair: &CourseDatePair) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let term = term.to_string();
        let course_code = pair.course_code.clone();
        let session_date = format_date(pair.session_date);

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let now = now_text();

            let aggregates = tx
                .execute(SOFT_DELETE_AGGREGATES_SQL, params![term, course_code, session_date, now])
                .map_err(map_sql_error)?;
            let records = tx
                .execute(MARK_RECORDS_PENDING_SQL, params![term, course_code, session_date, now])
                .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;

            debug!(
                term = %term,
                course_code = %course_code,
                session_date = %session_date,
                aggregates,
                records,
                "pair soft-deleted"
            );
            Ok(aggregates)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn complete_pairs(&self, term: &str, pairs: &[CourseDatePair]) -> Result<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }

        let db = Arc::clone(&self.db);
        let term = term.to_string();
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|pair| (pair.course_code.clone(), format_date(pair.session_date)))
            .collect();

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let now = now_text();
            let mut advanced = 0;

            {
                let mut records = tx.prepare(COMPLETE_RECORDS_SQL).map_err(map_sql_error)?;
                let mut aggregates = tx.prepare(COMPLETE_AGGREGATES_SQL).map_err(map_sql_error)?;
                for (course_code, session_date) in &pairs {
                    advanced += records
                        .execute(params![term, course_code, session_date, now])
                        .map_err(map_sql_error)?;
                    advanced += aggregates
                        .execute(params![term, course_code, session_date, now])
                        .map_err(map_sql_error)?;
                }
            }

            tx.commit().map_err(map_sql_error)?;
            Ok(advanced)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn upsert_aggregates(&self, aggregates: &[CourseAggregate]) -> Result<usize> {
        if aggregates.is_empty() {
            return Ok(0);
        }

        let db = Arc::clone(&self.db);
        let aggregates = aggregates.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let now = now_text();
            let mut written = 0;

            {
                let mut stmt = tx.prepare(UPSERT_AGGREGATE_SQL).map_err(map_sql_error)?;
                for aggregate in &aggregates {
                    let rooms = serde_json::to_string(&aggregate.rooms)
                        .map_err(|e| SyncError::Internal(format!("encode rooms: {e}")))?;
                    let teacher_ids = serde_json::to_string(&aggregate.teacher_ids)
                        .map_err(|e| SyncError::Internal(format!("encode teacher ids: {e}")))?;

                    written += stmt
                        .execute(params![
                            aggregate.course_code,
                            aggregate.term,
                            format_date(aggregate.session_date),
                            aggregate.period.as_str(),
                            format_time(aggregate.start_time),
                            format_time(aggregate.end_time),
                            rooms,
                            teacher_ids,
                            aggregate.session_count,
                            now,
                        ])
                        .map_err(map_sql_error)?;
                }
            }

            tx.commit().map_err(map_sql_error)?;
            Ok(written)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn retire_stale_aggregates(
        &self,
        term: &str,
        current: &[CourseAggregate],
    ) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let term = term.to_string();
        let keep: HashSet<(String, String, String)> = current
            .iter()
            .map(|aggregate| {
                (
                    aggregate.course_code.clone(),
                    format_date(aggregate.session_date),
                    aggregate.period.as_str().to_string(),
                )
            })
            .collect();

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let now = now_text();

            let stale: Vec<i64> = {
                let mut stmt = tx.prepare(LIVE_AGGREGATE_KEYS_SQL).map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![term], |row| {
                        Ok((row.get::<_, i64>(0)?, (row.get(1)?, row.get(2)?, row.get(3)?)))
                    })
                    .map_err(map_sql_error)?;
                rows.collect::<rusqlite::Result<Vec<(i64, (String, String, String))>>>()
                    .map_err(map_sql_error)?
                    .into_iter()
                    .filter(|(_, key)| !keep.contains(key))
                    .map(|(id, _)| id)
                    .collect()
            };

            let mut retired = 0;
            {
                let mut stmt = tx.prepare(RETIRE_AGGREGATE_SQL).map_err(map_sql_error)?;
                for id in &stale {
                    retired += stmt.execute(params![id, now]).map_err(map_sql_error)?;
                }
            }
            tx.commit().map_err(map_sql_error)?;

            if retired > 0 {
                debug!(term = %term, retired, "stale aggregates retired");
            }
            Ok(retired)
        })
        .await
        .map_err(map_join_error)?
    }
}

// Aggregates with no remaining source rows skip the removal stage, so they
// go straight to soft_delete_done.
const RETIRE_AGGREGATE_SQL: &str = "UPDATE course_aggregates
    SET marker = 'soft_delete_done', deleted_at = ?2, updated_at = ?2
    WHERE id = ?1 AND deleted_at IS NULL";

const LIVE_AGGREGATE_KEYS_SQL: &str = "SELECT id, course_code, session_date, period
    FROM course_aggregates
    WHERE term = ?1 AND deleted_at IS NULL";

const SOFT_DELETE_AGGREGATES_SQL: &str = "UPDATE course_aggregates
    SET marker = 'soft_delete_pending', deleted_at = ?4, updated_at = ?4
    WHERE term = ?1 AND course_code = ?2 AND session_date = ?3
      AND deleted_at IS NULL AND marker = 'unpropagated'";

const MARK_RECORDS_PENDING_SQL: &str = "UPDATE schedule_records
    SET marker = 'soft_delete_pending', updated_at = ?4
    WHERE term = ?1 AND course_code = ?2 AND session_date = ?3 AND marker = 'unpropagated'";

const COMPLETE_RECORDS_SQL: &str = "UPDATE schedule_records
    SET marker = 'soft_delete_done', updated_at = ?4
    WHERE term = ?1 AND course_code = ?2 AND session_date = ?3
      AND marker = 'soft_delete_pending'";

const COMPLETE_AGGREGATES_SQL: &str = "UPDATE course_aggregates
    SET marker = 'soft_delete_done', updated_at = ?4
    WHERE term = ?1 AND course_code = ?2 AND session_date = ?3
      AND marker = 'soft_delete_pending'";

// The WHERE on DO UPDATE keeps unchanged rows out of the change count.
const UPSERT_AGGREGATE_SQL: &str = "INSERT INTO course_aggregates (
        course_code, term, session_date, period, start_time, end_time, rooms, teacher_ids,
        session_count, marker, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'unpropagated', ?10, ?10)
    ON CONFLICT (course_code, term, session_date, period) WHERE deleted_at IS NULL
    DO UPDATE SET
        start_time = excluded.start_time,
        end_time = excluded.end_time,
        rooms = excluded.rooms,
        teacher_ids = excluded.teacher_ids,
        session_count = excluded.session_count,
        updated_at = excluded.updated_at
    WHERE course_aggregates.start_time IS NOT excluded.start_time
       OR course_aggregates.end_time IS NOT excluded.end_time
       OR course_aggregates.rooms IS NOT excluded.rooms
       OR course_aggregates.teacher_ids IS NOT excluded.teacher_ids
       OR course_aggregates.session_count IS NOT excluded.session_count";

const LIVE_AGGREGATES_SQL: &str = "SELECT
        course_code, term, session_date, period, start_time, end_time, rooms, teacher_ids,
        session_count
    FROM course_aggregates
    WHERE term = ?1 AND deleted_at IS NULL
    ORDER BY course_code, session_date, period";

fn map_aggregate_row(row: &Row<'_>) -> rusqlite::Result<CourseAggregate> {
    let course_code: String = row.get(0)?;
    let period_raw: String = row.get(3)?;
    let period = period_raw.parse::<DayPeriod>().map_err(|err: String| {
        warn!(course_code = %course_code, raw_period = %period_raw, "invalid aggregate period");
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, err.into())
    })?;

    Ok(CourseAggregate {
        course_code,
        term: row.get(1)?,
        session_date: date_column(row, 2)?,
        period,
        start_time: time_column(row, 4)?,
        end_time: time_column(row, 5)?,
        rooms: json_column(row, 6)?,
        teacher_ids: json_column(row, 7)?,
        session_count: row.get(8)?,
    })
}
