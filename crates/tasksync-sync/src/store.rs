//! # Record Store
//!
//! Key-addressed durable storage for task records.
//!
//! ## Failure Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_all()        fails soft: logs, returns an empty list              │
//! │  upsert/update/   fail loud: the facade aborts the operation and       │
//! │  remove/clear/    leaves in-memory state untouched                     │
//! │  replace_*                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use tasksync_core::{dedupe_by_id, Task, TaskPatch};
use tasksync_db::{Database, DbResult, TaskRepository};

/// Durable task storage used by the engine and the facade.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored task, at most once per id. Never fails.
    async fn get_all(&self) -> Vec<Task>;

    /// Inserts or replaces a record. New ids go to the head of the list.
    async fn upsert(&self, task: &Task) -> DbResult<()>;

    /// Merges a partial update into an existing record and returns it.
    async fn update(&self, id: &str, patch: &TaskPatch) -> DbResult<Task>;

    /// Moves a record to the confirmed task's id, keeping its position.
    async fn replace_id(&self, from_id: &str, confirmed: &Task) -> DbResult<()>;

    /// Replaces every record with `tasks`, in order.
    async fn replace_all(&self, tasks: &[Task]) -> DbResult<()>;

    /// Deletes one record. Returns true if it existed.
    async fn remove(&self, id: &str) -> DbResult<bool>;

    /// Deletes every record.
    async fn clear(&self) -> DbResult<()>;
}

// =============================================================================
// SQLite Record Store
// =============================================================================

/// [`RecordStore`] over the `tasks` table.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    tasks: TaskRepository,
}

impl SqliteRecordStore {
    pub fn new(db: &Database) -> Self {
        SqliteRecordStore { tasks: db.tasks() }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_all(&self) -> Vec<Task> {
        match self.tasks.get_all().await {
            Ok(tasks) => dedupe_by_id(tasks),
            Err(e) => {
                warn!(error = %e, "Failed to read tasks from store, treating as empty");
                Vec::new()
            }
        }
    }

    async fn upsert(&self, task: &Task) -> DbResult<()> {
        self.tasks.upsert(task).await
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> DbResult<Task> {
        self.tasks.update(id, patch).await
    }

    async fn replace_id(&self, from_id: &str, confirmed: &Task) -> DbResult<()> {
        self.tasks.replace_id(from_id, confirmed).await
    }

    async fn replace_all(&self, tasks: &[Task]) -> DbResult<()> {
        self.tasks.replace_all(tasks).await
    }

    async fn remove(&self, id: &str) -> DbResult<bool> {
        self.tasks.remove(id).await
    }

    async fn clear(&self) -> DbResult<()> {
        let removed = self.tasks.clear().await?;
        debug!(removed, "Record store cleared");
        Ok(())
    }
}
