//! SQLite-backed roster lookups.
//!
//! Students are enrolled per course offering. Teachers come from the
//! schedule rows of the session plus the course's teacher roster.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::RosterRepository;
use calsync_domain::{CourseDatePair, Participant, ParticipantRole, Result};
use rusqlite::{params, Row};
use tokio::task;

use super::columns::format_date;
use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqliteRosterRepository {
    db: Arc<DbManager>,
}

impl SqliteRosterRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn query_participants(
        &self,
        sql: &'static str,
        args: Vec<String>,
        role: ParticipantRole,
    ) -> Result<Vec<Participant>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<Participant>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                    map_participant_row(row, role)
                })
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl RosterRepository for SqliteRosterRepository {
    async fn teachers_for_pair(
        &self,
        term: &str,
        pair: &CourseDatePair,
    ) -> Result<Vec<Participant>> {
        let args = vec![term.to_string(), pair.course_code.clone(), format_date(pair.session_date)];
        self.query_participants(PAIR_TEACHERS_SQL, args, ParticipantRole::Teacher).await
    }

    async fn students_for_pair(
        &self,
        _term: &str,
        pair: &CourseDatePair,
    ) -> Result<Vec<Participant>> {
        let args = vec![pair.course_code.clone()];
        self.query_participants(COURSE_STUDENTS_SQL, args, ParticipantRole::Student).await
    }

    async fn course_participants(&self, course_code: &str) -> Result<Vec<Participant>> {
        let db = Arc::clone(&self.db);
        let course_code = course_code.to_string();

        task::spawn_blocking(move || -> Result<Vec<Participant>> {
            let conn = db.get_connection()?;
            let mut participants = Vec::new();

            for (sql, role) in [
                (COURSE_TEACHERS_SQL, ParticipantRole::Teacher),
                (COURSE_STUDENTS_SQL, ParticipantRole::Student),
            ] {
                let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![course_code], |row| map_participant_row(row, role))
                    .map_err(map_sql_error)?;
                for participant in rows {
                    participants.push(participant.map_err(map_sql_error)?);
                }
            }

            Ok(participants)
        })
        .await
        .map_err(map_join_error)?
    }
}

const PAIR_TEACHERS_SQL: &str = "SELECT t.user_id, t.display_name
    FROM schedule_records r
    JOIN teachers t ON t.user_id = r.teacher_id
    WHERE r.term = ?1 AND r.course_code = ?2 AND r.session_date = ?3 AND t.is_active = 1
    UNION
    SELECT t.user_id, t.display_name
    FROM course_teachers ct
    JOIN teachers t ON t.user_id = ct.user_id
    WHERE ct.course_code = ?2 AND ct.is_active = 1 AND t.is_active = 1
    ORDER BY 1";

const COURSE_TEACHERS_SQL: &str = "SELECT t.user_id, t.display_name
    FROM course_teachers ct
    JOIN teachers t ON t.user_id = ct.user_id
    WHERE ct.course_code = ?1 AND ct.is_active = 1 AND t.is_active = 1
    ORDER BY t.user_id";

const COURSE_STUDENTS_SQL: &str = "SELECT s.user_id, s.display_name
    FROM course_students cs
    JOIN students s ON s.user_id = cs.user_id
    WHERE cs.course_code = ?1 AND cs.is_active = 1 AND s.is_active = 1
    ORDER BY s.user_id";

fn map_participant_row(row: &Row<'_>, role: ParticipantRole) -> rusqlite::Result<Participant> {
    Ok(Participant { user_id: row.get(0)?, role, display_name: row.get(1)? })
}
