//! # Pending Change Repository
//!
//! Durable storage for the pending change ledger.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Ledger Table Lifecycle                               │
//! │                                                                         │
//! │  LOCAL MUTATION (offline, or direct remote write failed)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO pending_changes (id, kind, entity_id, payload, ...)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            DRAIN (tasksync-sync::SyncEngine)                    │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * ORDER BY created_at, seq                          │   │
//! │  │                                                                 │   │
//! │  │  2. For each entry, oldest first:                              │   │
//! │  │     a. Replay against the remote                               │   │
//! │  │     b. On success: DELETE WHERE id = ?  (identity, not index)  │   │
//! │  │     c. On failure: UPDATE retry_count += 1, last_retry,        │   │
//! │  │                    last_error; stop the pass                   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Entries are never dropped before a confirmed replay                 │
//! │  • Entries enqueued during a drain survive it                          │
//! │  • Replay order is creation order                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tasksync_core::{ChangeOperation, PendingChange};

/// Row shape of the `pending_changes` table.
#[derive(Debug, FromRow)]
struct PendingChangeRow {
    seq: i64,
    id: String,
    kind: String,
    entity_id: String,
    payload: String,
    created_at: DateTime<Utc>,
    retry_count: i64,
    last_retry: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl PendingChangeRow {
    fn into_change(self) -> DbResult<PendingChange> {
        let operation: ChangeOperation = serde_json::from_str(&self.payload)?;

        if operation.kind().as_str() != self.kind || operation.entity_id() != self.entity_id {
            return Err(DbError::Serialization(format!(
                "pending change {} payload does not match its {} row for {}",
                self.id, self.kind, self.entity_id
            )));
        }

        Ok(PendingChange {
            id: self.id,
            operation,
            timestamp: self.created_at,
            retry_count: self.retry_count,
            last_retry: self.last_retry,
            error: self.last_error,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT seq, id, kind, entity_id, payload, created_at,
           retry_count, last_retry, last_error
    FROM pending_changes
"#;

/// Decodes rows and sorts them into replay order.
///
/// Timestamps are compared as values, since their text encoding does not
/// sort reliably.
fn into_replay_order(rows: Vec<PendingChangeRow>) -> DbResult<Vec<PendingChange>> {
    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let seq = row.seq;
            row.into_change().map(|change| (change.timestamp, seq, change))
        })
        .collect::<DbResult<Vec<_>>>()?;

    keyed.sort_by_key(|(timestamp, seq, _)| (*timestamp, *seq));
    Ok(keyed.into_iter().map(|(_, _, change)| change).collect())
}

/// Repository for pending change ledger rows.
#[derive(Debug, Clone)]
pub struct PendingChangeRepository {
    pool: SqlitePool,
}

impl PendingChangeRepository {
    /// Creates a new PendingChangeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PendingChangeRepository { pool }
    }

    /// Appends an entry to the ledger.
    ///
    /// No deduplication: two edits of the same task are two rows.
    pub async fn enqueue(&self, change: &PendingChange) -> DbResult<()> {
        let payload = serde_json::to_string(&change.operation)?;

        debug!(
            change_id = %change.id,
            kind = %change.kind(),
            entity_id = %change.entity_id(),
            "Enqueuing pending change"
        );

        sqlx::query(
            r#"
            INSERT INTO pending_changes (
                id, kind, entity_id, payload, created_at,
                retry_count, last_retry, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&change.id)
        .bind(change.kind().as_str())
        .bind(change.entity_id())
        .bind(payload)
        .bind(change.timestamp)
        .bind(change.retry_count)
        .bind(change.last_retry)
        .bind(change.error.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns every entry, oldest first (ties broken by insertion order).
    pub async fn list_ordered(&self) -> DbResult<Vec<PendingChange>> {
        let sql = format!("{} ORDER BY created_at ASC, seq ASC", SELECT_COLUMNS);
        let rows: Vec<PendingChangeRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        into_replay_order(rows)
    }

    /// Returns the entries targeting one task, oldest first.
    pub async fn list_for_entity(&self, entity_id: &str) -> DbResult<Vec<PendingChange>> {
        let sql = format!(
            "{} WHERE entity_id = ?1 ORDER BY created_at ASC, seq ASC",
            SELECT_COLUMNS
        );
        let rows: Vec<PendingChangeRow> = sqlx::query_as(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;

        into_replay_order(rows)
    }

    /// Deletes one entry by its ledger id. Returns true if it existed.
    pub async fn remove(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM pending_changes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every entry targeting one task. Returns the number removed.
    pub async fn remove_for_entity(&self, entity_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pending_changes WHERE entity_id = ?1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Settles a confirmed create in one transaction: deletes the entry `id`
    /// and retargets the remaining entries for `from` to `to`.
    ///
    /// Returns false, changing nothing, if the entry was already gone.
    pub async fn confirm_create(&self, id: &str, from: &str, to: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM pending_changes WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        if !removed {
            return Ok(false);
        }

        let rewritten = rekey_rows(&mut tx, from, to).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(change_id = %id, from = %from, to = %to, rekeyed = rewritten, "Create confirmed");
        Ok(true)
    }

    /// Records a failed replay attempt on one entry.
    pub async fn record_failure(&self, id: &str, error: &str, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pending_changes SET
                retry_count = retry_count + 1,
                last_retry = ?2,
                last_error = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingChange", id));
        }
        Ok(())
    }

    /// Deletes every entry. Returns the number removed.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pending_changes")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts entries awaiting replay.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_changes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts entries whose last replay attempt failed.
    pub async fn count_failed(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pending_changes WHERE last_error IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

async fn rekey_rows(conn: &mut SqliteConnection, from: &str, to: &str) -> DbResult<u64> {
    let sql = format!("{} WHERE entity_id = ?1", SELECT_COLUMNS);
    let rows: Vec<PendingChangeRow> = sqlx::query_as(&sql)
        .bind(from)
        .fetch_all(&mut *conn)
        .await?;

    let mut rewritten = 0;
    for row in rows {
        let change = row.into_change()?;
        let operation = change.operation.rekeyed(from, to);
        let payload = serde_json::to_string(&operation)?;

        sqlx::query("UPDATE pending_changes SET entity_id = ?2, payload = ?3 WHERE id = ?1")
            .bind(&change.id)
            .bind(to)
            .bind(payload)
            .execute(&mut *conn)
            .await?;
        rewritten += 1;
    }
    Ok(rewritten)
}
