//! # Pending Change Ledger
//!
//! Durable FIFO log of mutations awaiting remote confirmation.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  enqueue(add  A)   t=100  ─┐                                           │
//! │  enqueue(edit A)   t=100  ─┼──► drain() ──► [add A, edit A, delete B]  │
//! │  enqueue(del  B)   t=101  ─┘     oldest first, insertion order on ties │
//! │                                                                         │
//! │  Timestamps handed out by one ledger never go backwards, so a clock    │
//! │  step cannot reorder an `add` behind its own `update`.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries leave the ledger only through [`PendingChangeLedger::remove`] and
//! [`PendingChangeLedger::confirm_add`] (confirmed replay),
//! [`PendingChangeLedger::remove_for_task`] (the task never reached the
//! remote) or [`PendingChangeLedger::clear`].

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{debug, warn};

use tasksync_core::{ChangeOperation, PendingChange};
use tasksync_db::{Database, DbError, DbResult, PendingChangeRepository};

/// The durable mutation log.
#[derive(Debug)]
pub struct PendingChangeLedger {
    repo: PendingChangeRepository,

    /// Last timestamp handed out.
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl PendingChangeLedger {
    pub fn new(db: &Database) -> Self {
        PendingChangeLedger {
            repo: db.pending_changes(),
            last_stamp: Mutex::new(None),
        }
    }

    fn next_stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_stamp.lock() {
            Ok(mut last) => {
                let stamp = match *last {
                    Some(prev) if prev > now => prev,
                    _ => now,
                };
                *last = Some(stamp);
                stamp
            }
            Err(_) => now,
        }
    }

    /// Appends a change stamped with the current time and zero retries.
    ///
    /// Never coalesces with earlier entries for the same task.
    pub async fn enqueue(&self, operation: ChangeOperation) -> DbResult<PendingChange> {
        let change = PendingChange::new(operation, self.next_stamp());
        self.repo.enqueue(&change).await?;

        debug!(
            change_id = %change.id,
            kind = %change.kind(),
            task_id = %change.entity_id(),
            "Change enqueued"
        );
        Ok(change)
    }

    /// Every entry in strict replay order.
    pub async fn drain(&self) -> DbResult<Vec<PendingChange>> {
        self.repo.list_ordered().await
    }

    /// Removes one entry by identity. Returns false if it was already gone.
    pub async fn remove(&self, change: &PendingChange) -> DbResult<bool> {
        self.repo.remove(&change.id).await
    }

    /// Removes every entry that targets `task_id`.
    pub async fn remove_for_task(&self, task_id: &str) -> DbResult<u64> {
        self.repo.remove_for_entity(task_id).await
    }

    /// Settles a confirmed `add`: the entry leaves the ledger and every later
    /// entry for its temporary id moves to `server_id`, atomically.
    ///
    /// Returns false if the entry was withdrawn in the meantime.
    pub async fn confirm_add(&self, change: &PendingChange, server_id: &str) -> DbResult<bool> {
        self.repo
            .confirm_create(&change.id, change.entity_id(), server_id)
            .await
    }

    /// True while `change` is still queued.
    pub async fn contains(&self, change: &PendingChange) -> DbResult<bool> {
        Ok(self
            .entries_for(change.entity_id())
            .await?
            .iter()
            .any(|entry| entry.id == change.id))
    }

    /// Stamps a failed replay on an entry.
    ///
    /// An entry removed while its replay was in flight is ignored.
    pub async fn record_failure(&self, change: &PendingChange, error: &str) -> DbResult<()> {
        match self.repo.record_failure(&change.id, error, Utc::now()).await {
            Ok(()) => Ok(()),
            Err(DbError::NotFound { .. }) => {
                warn!(change_id = %change.id, "Failed entry no longer in ledger");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Empties the ledger.
    pub async fn clear(&self) -> DbResult<u64> {
        self.repo.clear().await
    }

    pub async fn pending_count(&self) -> DbResult<usize> {
        Ok(self.repo.count_pending().await? as usize)
    }

    /// Entries whose last replay failed.
    pub async fn failed_count(&self) -> DbResult<usize> {
        Ok(self.repo.count_failed().await? as usize)
    }

    pub async fn is_empty(&self) -> DbResult<bool> {
        Ok(self.pending_count().await? == 0)
    }

    /// Entries targeting one task, oldest first.
    pub async fn entries_for(&self, task_id: &str) -> DbResult<Vec<PendingChange>> {
        self.repo.list_for_entity(task_id).await
    }
}
