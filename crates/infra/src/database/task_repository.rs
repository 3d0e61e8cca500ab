//! SQLite-backed task tracker.
//!
//! The partial unique index `ux_sync_tasks_active_key` is the business-key
//! lock: inserting a second pending/running/paused task with the same key
//! fails with a unique violation, surfaced as `ConcurrencyConflict`.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::TaskTracker;
use calsync_domain::{NewTask, Result, SyncError, TaskKind, TaskRecord, TaskStatus};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use tokio::task;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::columns::{instant_column, now_text};
use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqliteTaskTracker {
    db: Arc<DbManager>,
}

impl SqliteTaskTracker {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Most recent task holding `business_key`, active or not.
    pub async fn latest_for_key(&self, business_key: &str) -> Result<Option<TaskRecord>> {
        let db = Arc::clone(&self.db);
        let business_key = business_key.to_string();

        task::spawn_blocking(move || -> Result<Option<TaskRecord>> {
            let conn = db.get_connection()?;
            conn.query_row(LATEST_FOR_KEY_SQL, params![business_key], map_task_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    fn load(conn: &Connection, task_id: &str) -> Result<TaskRecord> {
        conn.query_row(SELECT_TASK_SQL, params![task_id], map_task_row)
            .optional()
            .map_err(map_sql_error)?
            .ok_or_else(|| SyncError::NotFound(format!("task {task_id}")))
    }

    fn insert(
        conn: &Connection,
        kind: TaskKind,
        business_key: &str,
        parent_id: Option<&str>,
        payload: &Value,
        attempt: u32,
    ) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = now_text();
        conn.execute(
            INSERT_TASK_SQL,
            params![
                id,
                parent_id,
                kind.as_str(),
                business_key,
                TaskStatus::Pending.as_str(),
                payload.to_string(),
                attempt,
                now,
            ],
        )
        .map_err(|err| match map_sql_error(err) {
            SyncError::ConcurrencyConflict(_) => SyncError::ConcurrencyConflict(format!(
                "an active task already holds business key {business_key}"
            )),
            other => other,
        })?;
        Ok(id)
    }

    async fn transition(
        &self,
        task_id: &str,
        allowed_from: Option<TaskStatus>,
        next: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<TaskRecord> {
        let db = Arc::clone(&self.db);
        let task_id = task_id.to_string();

        task::spawn_blocking(move || -> Result<TaskRecord> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let current = Self::load(&tx, &task_id)?;
            let from_ok = allowed_from.map_or(true, |status| current.status == status);
            if !from_ok || !current.status.can_transition_to(next) {
                return Err(SyncError::Validation(format!(
                    "task {task_id} cannot move from {} to {next}",
                    current.status
                )));
            }

            let result = result.map(|value| value.to_string());
            tx.execute(
                UPDATE_STATUS_SQL,
                params![task_id, next.as_str(), result, error, now_text()],
            )
            .map_err(map_sql_error)?;
            let updated = Self::load(&tx, &task_id)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(updated)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl TaskTracker for SqliteTaskTracker {
    #[instrument(skip(self, new_task), fields(business_key = %new_task.business_key))]
    async fn create(&self, new_task: NewTask) -> Result<TaskRecord> {
        let db = Arc::clone(&self.db);

        let record = task::spawn_blocking(move || -> Result<TaskRecord> {
            let conn = db.get_connection()?;
            let id = Self::insert(
                &conn,
                new_task.kind,
                &new_task.business_key,
                new_task.parent_id.as_deref(),
                &new_task.payload,
                1,
            )?;
            Self::load(&conn, &id)
        })
        .await
        .map_err(map_join_error)??;

        info!(task_id = %record.id, kind = %record.kind, "task created");
        Ok(record)
    }

    async fn status(&self, task_id: &str) -> Result<TaskRecord> {
        let db = Arc::clone(&self.db);
        let task_id = task_id.to_string();

        task::spawn_blocking(move || -> Result<TaskRecord> {
            let conn = db.get_connection()?;
            Self::load(&conn, &task_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn start(&self, task_id: &str) -> Result<TaskRecord> {
        self.transition(task_id, Some(TaskStatus::Pending), TaskStatus::Running, None, None).await
    }

    async fn pause(&self, task_id: &str) -> Result<TaskRecord> {
        self.transition(task_id, None, TaskStatus::Paused, None, None).await
    }

    async fn resume(&self, task_id: &str) -> Result<TaskRecord> {
        self.transition(task_id, Some(TaskStatus::Paused), TaskStatus::Running, None, None).await
    }

    async fn cancel(&self, task_id: &str) -> Result<TaskRecord> {
        self.transition(task_id, None, TaskStatus::Cancelled, None, None).await
    }

    #[instrument(skip(self))]
    async fn retry(&self, task_id: &str) -> Result<TaskRecord> {
        let db = Arc::clone(&self.db);
        let task_id = task_id.to_string();

        let record = task::spawn_blocking(move || -> Result<TaskRecord> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let previous = Self::load(&tx, &task_id)?;
            if !previous.status.is_retryable() {
                return Err(SyncError::Validation(format!(
                    "task {task_id} is {} and cannot be retried",
                    previous.status
                )));
            }

            let id = Self::insert(
                &tx,
                previous.kind,
                &previous.business_key,
                previous.parent_id.as_deref(),
                &previous.payload,
                previous.attempt.saturating_add(1),
            )?;
            let retried = Self::load(&tx, &id)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(retried)
        })
        .await
        .map_err(map_join_error)??;

        info!(task_id = %record.id, attempt = record.attempt, "task retried");
        Ok(record)
    }

    async fn finish(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<TaskRecord> {
        if status.is_active() {
            return Err(SyncError::Validation(format!(
                "finish requires a terminal status, got {status}"
            )));
        }
        self.transition(task_id, None, status, result, error).await
    }

    async fn children(&self, parent_id: &str) -> Result<Vec<TaskRecord>> {
        let db = Arc::clone(&self.db);
        let parent_id = parent_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<TaskRecord>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(CHILDREN_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![parent_id], map_task_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const SELECT_TASK_SQL: &str = "SELECT
        id, parent_id, kind, business_key, status, payload, result, error, attempt,
        created_at, updated_at
    FROM sync_tasks WHERE id = ?1";

const LATEST_FOR_KEY_SQL: &str = "SELECT
        id, parent_id, kind, business_key, status, payload, result, error, attempt,
        created_at, updated_at
    FROM sync_tasks WHERE business_key = ?1
    ORDER BY created_at DESC, id DESC
    LIMIT 1";

const CHILDREN_SQL: &str = "SELECT
        id, parent_id, kind, business_key, status, payload, result, error, attempt,
        created_at, updated_at
    FROM sync_tasks WHERE parent_id = ?1
    ORDER BY created_at, id";

const INSERT_TASK_SQL: &str = "INSERT INTO sync_tasks (
        id, parent_id, kind, business_key, status, payload, attempt, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)";

const UPDATE_STATUS_SQL: &str = "UPDATE sync_tasks SET
        status = ?2,
        result = COALESCE(?3, result),
        error = COALESCE(?4, error),
        updated_at = ?5
    WHERE id = ?1";

fn map_task_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let id: String = row.get(0)?;
    let kind_raw: String = row.get(2)?;
    let kind = kind_raw.parse::<TaskKind>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, err.into())
    })?;
    let status_raw: String = row.get(4)?;
    let status = parse_status(&id, &status_raw);
    let payload_raw: String = row.get(5)?;
    let result_raw: Option<String> = row.get(6)?;

    Ok(TaskRecord {
        parent_id: row.get(1)?,
        kind,
        business_key: row.get(3)?,
        status,
        payload: parse_json(&id, &payload_raw).unwrap_or(Value::Null),
        result: result_raw.and_then(|raw| parse_json(&id, &raw)),
        error: row.get(7)?,
        attempt: row.get(8)?,
        created_at: instant_column(row, 9)?,
        updated_at: instant_column(row, 10)?,
        id,
    })
}

fn parse_status(id: &str, raw: &str) -> TaskStatus {
    match raw.parse::<TaskStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                task_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid task status in database, treating as failed"
            );
            TaskStatus::Failed
        }
    }
}

fn parse_json(id: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(task_id = %id, error = %err, "invalid JSON stored on task");
            None
        }
    }
}
