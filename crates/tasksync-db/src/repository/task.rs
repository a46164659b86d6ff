//! # Task Repository
//!
//! Durable task records, keyed by task id.
//!
//! ## List Order
//! ```text
//! position   id                        title
//! ────────   ───────────────────────   ──────────
//!    -2      local_1760451239000_ab12   newest add   ← upsert of a new id
//!    -1      local_1760451234567_3f9a   older add      goes to the head
//!     0      201                        from remote
//!     1      202                        from remote  ← replace_all writes 0..n
//! ```
//!
//! Upserting an existing id keeps its position.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use tasksync_core::{dedupe_by_id, Task, TaskPatch};

/// Row shape of the `tasks` table.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    title: String,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    reminder_date: Option<DateTime<Utc>>,
    reminder_enabled: bool,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            title: row.title,
            completed: row.completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
            due_date: row.due_date,
            reminder_date: row.reminder_date,
            reminder_enabled: row.reminder_enabled,
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, title, completed, created_at, updated_at,
           due_date, reminder_date, reminder_enabled
    FROM tasks
"#;

/// Repository for task records.
#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    /// Creates a new TaskRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaskRepository { pool }
    }

    /// Returns every task in list order, at most one record per id.
    pub async fn get_all(&self) -> DbResult<Vec<Task>> {
        let sql = format!("{} ORDER BY position ASC, rowid ASC", SELECT_COLUMNS);
        let rows: Vec<TaskRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let count = rows.len();
        let tasks = dedupe_by_id(rows.into_iter().map(Task::from).collect());
        if tasks.len() != count {
            warn!(
                read = count,
                kept = tasks.len(),
                "Duplicate task ids found in store"
            );
        }

        Ok(tasks)
    }

    /// Gets a task by id.
    ///
    /// ## Returns
    /// * `Ok(Some(task))` - Task found
    /// * `Ok(None)` - No record with this id
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Task>> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Task::from))
    }

    /// Inserts or replaces a task.
    ///
    /// A new id is placed at the head of the list.
    pub async fn upsert(&self, task: &Task) -> DbResult<()> {
        debug!(task_id = %task.id, "Upserting task");

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, title, completed, created_at, updated_at,
                due_date, reminder_date, reminder_enabled, position
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, (SELECT COALESCE(MIN(position), 0) - 1 FROM tasks)
            )
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                completed = excluded.completed,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                due_date = excluded.due_date,
                reminder_date = excluded.reminder_date,
                reminder_enabled = excluded.reminder_enabled
            "#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(task.completed)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.due_date)
        .bind(task.reminder_date)
        .bind(task.reminder_enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies a partial update to an existing task and returns the result.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - No record with this id
    pub async fn update(&self, id: &str, patch: &TaskPatch) -> DbResult<Task> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let current = row
            .map(Task::from)
            .ok_or_else(|| DbError::not_found("Task", id))?;
        let updated = current.apply(patch, Utc::now());

        sqlx::query(
            r#"
            UPDATE tasks SET
                title = ?2,
                completed = ?3,
                updated_at = ?4,
                due_date = ?5,
                reminder_date = ?6,
                reminder_enabled = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(&updated.title)
        .bind(updated.completed)
        .bind(updated.updated_at)
        .bind(updated.due_date)
        .bind(updated.reminder_date)
        .bind(updated.reminder_enabled)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(task_id = %id, "Task updated");
        Ok(updated)
    }

    /// Moves the record at `from_id` to the confirmed task's id, keeping its
    /// list position.
    ///
    /// A record that already exists under the confirmed id is replaced.
    /// If `from_id` is gone the confirmed task is inserted at the head.
    pub async fn replace_id(&self, from_id: &str, confirmed: &Task) -> DbResult<()> {
        debug!(from = %from_id, to = %confirmed.id, "Replacing task id");

        let mut tx = self.pool.begin().await?;

        if from_id != confirmed.id {
            sqlx::query("DELETE FROM tasks WHERE id = ?1")
                .bind(&confirmed.id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                id = ?2,
                title = ?3,
                completed = ?4,
                created_at = ?5,
                updated_at = ?6,
                due_date = ?7,
                reminder_date = ?8,
                reminder_enabled = ?9
            WHERE id = ?1
            "#,
        )
        .bind(from_id)
        .bind(&confirmed.id)
        .bind(&confirmed.title)
        .bind(confirmed.completed)
        .bind(confirmed.created_at)
        .bind(confirmed.updated_at)
        .bind(confirmed.due_date)
        .bind(confirmed.reminder_date)
        .bind(confirmed.reminder_enabled)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO tasks (
                    id, title, completed, created_at, updated_at,
                    due_date, reminder_date, reminder_enabled, position
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, (SELECT COALESCE(MIN(position), 0) - 1 FROM tasks)
                )
                "#,
            )
            .bind(&confirmed.id)
            .bind(&confirmed.title)
            .bind(confirmed.completed)
            .bind(confirmed.created_at)
            .bind(confirmed.updated_at)
            .bind(confirmed.due_date)
            .bind(confirmed.reminder_date)
            .bind(confirmed.reminder_enabled)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Replaces the whole table with `tasks`, in the given order.
    pub async fn replace_all(&self, tasks: &[Task]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tasks").execute(&mut *tx).await?;

        for (position, task) in tasks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO tasks (
                    id, title, completed, created_at, updated_at,
                    due_date, reminder_date, reminder_enabled, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&task.id)
            .bind(&task.title)
            .bind(task.completed)
            .bind(task.created_at)
            .bind(task.updated_at)
            .bind(task.due_date)
            .bind(task.reminder_date)
            .bind(task.reminder_enabled)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(count = tasks.len(), "Task table replaced");
        Ok(())
    }

    /// Deletes a task. Returns true if a record was removed.
    pub async fn remove(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every task. Returns the number of removed records.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM tasks")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts stored tasks.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
