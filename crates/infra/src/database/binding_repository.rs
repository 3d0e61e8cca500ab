//! Local record of per-user external calendar entries.

use std::sync::Arc;

use calsync_domain::{CourseDatePair, ParticipantRole, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::warn;

use super::columns::{date_column, format_date, now_text};
use super::manager::{map_join_error, map_sql_error, DbManager};

/// One external calendar event created for a participant's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarBinding {
    pub id: i64,
    pub user_id: String,
    pub role: ParticipantRole,
    pub course_code: String,
    pub term: String,
    pub session_date: NaiveDate,
    pub calendar_id: String,
    pub external_event_id: String,
}

pub struct SqliteBindingRepository {
    db: Arc<DbManager>,
}

impl SqliteBindingRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Store a binding and return its row id.
    pub async fn record_binding(&self, binding: CalendarBinding) -> Result<i64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            conn.execute(
                INSERT_BINDING_SQL,
                params![
                    binding.user_id,
                    binding.role.as_str(),
                    binding.course_code,
                    binding.term,
                    format_date(binding.session_date),
                    binding.calendar_id,
                    binding.external_event_id,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_join_error)?
    }

    /// Live bindings of one participant for one course session.
    pub async fn find_live(
        &self,
        term: &str,
        pair: &CourseDatePair,
        user_id: &str,
        role: ParticipantRole,
    ) -> Result<Vec<CalendarBinding>> {
        let db = Arc::clone(&self.db);
        let args = (
            term.to_string(),
            pair.course_code.clone(),
            format_date(pair.session_date),
            user_id.to_string(),
        );

        task::spawn_blocking(move || -> Result<Vec<CalendarBinding>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(LIVE_BINDINGS_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![args.0, args.1, args.2, args.3, role.as_str()], map_binding_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Soft-delete one binding. Returns `false` if it was already gone.
    pub async fn mark_deleted(&self, id: i64) -> Result<bool> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let updated =
                conn.execute(SOFT_DELETE_BINDING_SQL, params![id, now_text()]).map_err(map_sql_error)?;
            Ok(updated > 0)
        })
        .await
        .map_err(map_join_error)?
    }
}

const INSERT_BINDING_SQL: &str = "INSERT INTO calendar_bindings (
        user_id, role, course_code, term, session_date, calendar_id, external_event_id
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const LIVE_BINDINGS_SQL: &str = "SELECT
        id, user_id, role, course_code, term, session_date, calendar_id, external_event_id
    FROM calendar_bindings
    WHERE term = ?1 AND course_code = ?2 AND session_date = ?3 AND user_id = ?4 AND role = ?5
      AND deleted_at IS NULL
    ORDER BY id";

const SOFT_DELETE_BINDING_SQL: &str =
    "UPDATE calendar_bindings SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL";

fn map_binding_row(row: &Row<'_>) -> rusqlite::Result<CalendarBinding> {
    let id: i64 = row.get(0)?;
    let role_raw: String = row.get(2)?;
    let role = role_raw.parse::<ParticipantRole>().unwrap_or_else(|err| {
        warn!(
            binding_id = id,
            raw_role = %role_raw,
            error = %err,
            "invalid binding role, treating as student"
        );
        ParticipantRole::Student
    });

    Ok(CalendarBinding {
        id,
        user_id: row.get(1)?,
        role,
        course_code: row.get(3)?,
        term: row.get(4)?,
        session_date: date_column(row, 5)?,
        calendar_id: row.get(6)?,
        external_event_id: row.get(7)?,
    })
}
