//! Durable task store.
//!
//! SQLite persistence for the scheduler's task list. The list is read and
//! rewritten only inside transactions: callers `begin()`, read the current
//! state with [`TaskStore::load_tasks`], stage a new state with
//! [`TaskStore::replace_tasks`] or [`TaskStore::update_task`], and commit.
//! Timestamps are stored as RFC 3339 text with the local offset; retry
//! delays as integer milliseconds.

mod records;

pub use records::TaskRecord;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use sqlx::sqlite::SqlitePool;
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use tracing::{debug, error, info};

pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    /// Open (creating if needed) a task store at the given path.
    pub async fn open(database_path: &str) -> Result<Self> {
        info!("Opening task store at {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    error!("Failed to create parent directory {:?}: {}", parent, e);
                    anyhow!("failed to create {:?}: {}", parent, e)
                })?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = SqlitePool::connect(&database_url).await.map_err(|e| {
            error!("Failed to connect to task store {}: {}", database_url, e);
            anyhow!("failed to connect to {}: {}", database_url, e)
        })?;

        let store = Self { pool };
        store.initialize_tables().await?;
        info!("Task store ready at {}", database_path);
        Ok(store)
    }

    /// An in-memory store, mainly for tests and embedding experiments.
    ///
    /// Pinned to a single pooled connection: every SQLite `:memory:`
    /// connection is its own database, and an idle-reaped connection would
    /// take the data with it.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.initialize_tables().await?;
        Ok(store)
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                position INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                cron_expression TEXT NOT NULL,
                retry_delay_ms INTEGER NOT NULL,
                last_success_time TEXT,
                last_failure_time TEXT,
                last_attempt_time TEXT,
                pending_retry_until TEXT,
                scheduler_identifier TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create scheduled_tasks table: {}", e);
            anyhow!("failed to create scheduled_tasks table: {}", e)
        })?;

        debug!("scheduled_tasks table ready");
        Ok(())
    }

    /// Begin a transaction over the task list.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Read the task list, in registration order, inside `tx`.
    pub async fn load_tasks(tx: &mut Transaction<'static, Sqlite>) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT name, cron_expression, retry_delay_ms,
                   last_success_time, last_failure_time, last_attempt_time,
                   pending_retry_until, scheduler_identifier
            FROM scheduled_tasks
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&mut **tx)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(TaskRecord {
                name: row.try_get("name")?,
                cron_expression: row.try_get("cron_expression")?,
                retry_delay_ms: row.try_get("retry_delay_ms")?,
                last_success_time: read_timestamp(&row, "last_success_time")?,
                last_failure_time: read_timestamp(&row, "last_failure_time")?,
                last_attempt_time: read_timestamp(&row, "last_attempt_time")?,
                pending_retry_until: read_timestamp(&row, "pending_retry_until")?,
                scheduler_identifier: row.try_get("scheduler_identifier")?,
            });
        }
        Ok(tasks)
    }

    /// Stage a full rewrite of the task list inside `tx`.
    pub async fn replace_tasks(
        tx: &mut Transaction<'static, Sqlite>,
        tasks: &[TaskRecord],
    ) -> Result<()> {
        sqlx::query("DELETE FROM scheduled_tasks")
            .execute(&mut **tx)
            .await?;

        for (position, task) in tasks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO scheduled_tasks (
                    position, name, cron_expression, retry_delay_ms,
                    last_success_time, last_failure_time, last_attempt_time,
                    pending_retry_until, scheduler_identifier
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position as i64)
            .bind(&task.name)
            .bind(&task.cron_expression)
            .bind(task.retry_delay_ms)
            .bind(write_timestamp(&task.last_success_time))
            .bind(write_timestamp(&task.last_failure_time))
            .bind(write_timestamp(&task.last_attempt_time))
            .bind(write_timestamp(&task.pending_retry_until))
            .bind(&task.scheduler_identifier)
            .execute(&mut **tx)
            .await?;
        }

        debug!("Staged {} task records", tasks.len());
        Ok(())
    }

    /// Stage an update of one task's lifecycle fields inside `tx`.
    pub async fn update_task(
        tx: &mut Transaction<'static, Sqlite>,
        task: &TaskRecord,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET cron_expression = ?,
                retry_delay_ms = ?,
                last_success_time = ?,
                last_failure_time = ?,
                last_attempt_time = ?,
                pending_retry_until = ?,
                scheduler_identifier = ?
            WHERE name = ?
            "#,
        )
        .bind(&task.cron_expression)
        .bind(task.retry_delay_ms)
        .bind(write_timestamp(&task.last_success_time))
        .bind(write_timestamp(&task.last_failure_time))
        .bind(write_timestamp(&task.last_attempt_time))
        .bind(write_timestamp(&task.pending_retry_until))
        .bind(&task.scheduler_identifier)
        .bind(&task.name)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("no persisted task named '{}'", task.name));
        }
        Ok(())
    }

    /// Read the task list outside any caller-held transaction.
    pub async fn load_all(&self) -> Result<Vec<TaskRecord>> {
        let mut tx = self.begin().await?;
        let tasks = Self::load_tasks(&mut tx).await?;
        tx.commit().await?;
        Ok(tasks)
    }
}

fn write_timestamp(at: &Option<DateTime<Local>>) -> Option<String> {
    at.map(|at| at.to_rfc3339())
}

fn read_timestamp(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Local>>> {
    let text: Option<String> = row.try_get(column)?;
    match text {
        Some(text) => {
            let parsed = DateTime::parse_from_rfc3339(&text)
                .map_err(|e| anyhow!("bad timestamp in column {}: {}", column, e))?;
            Ok(Some(parsed.with_timezone(&Local)))
        }
        None => Ok(None),
    }
}
