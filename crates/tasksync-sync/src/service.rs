//! # Task Service
//!
//! The operation surface callers mutate tasks through.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add / edit / delete                        (under the mutation lock)  │
//! │                                                                         │
//! │   validate ──► record store write ──► publish new list                 │
//! │                      │ fails                  │                         │
//! │                      ▼                        ▼                         │
//! │              caller gets the error    online and ledger empty?         │
//! │              (list unchanged)          ├─ yes ──► remote call          │
//! │                                        │          └─ fails ──► ledger  │
//! │                                        └─ no  ──► ledger ──► drain     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote failures never reach the caller. They end up in the ledger and in
//! [`TaskService::last_error`].

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tasksync_core::{ChangeOperation, PendingChange, SyncIndicator, Task, TaskPatch};

use crate::engine::{prepend_task, replace_task, without_task, SyncEngine, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteAck;

/// Number of in-flight operations per task id.
type LoadingMap = HashMap<String, usize>;

/// Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct TaskService {
    engine: Arc<SyncEngine>,
    loading: Arc<watch::Sender<LoadingMap>>,
}

impl TaskService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let (loading, _) = watch::channel(LoadingMap::new());
        TaskService {
            engine,
            loading: Arc::new(loading),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    // =========================================================================
    // Read Side
    // =========================================================================

    /// Current snapshot, newest tasks first.
    pub fn list(&self) -> Arc<Vec<Task>> {
        self.engine.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Task>>> {
        self.engine.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncIndicator> {
        self.engine.subscribe_status()
    }

    pub fn status(&self) -> SyncIndicator {
        self.engine.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.engine.last_error()
    }

    /// Ids with an edit or delete in flight.
    pub fn loading_ids(&self) -> HashSet<String> {
        self.loading.borrow().keys().cloned().collect()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<LoadingMap> {
        self.loading.subscribe()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(&self) {
        self.engine.start();
    }

    pub async fn load_initial(&self) -> SyncResult<()> {
        self.engine.load_initial().await
    }

    /// Forces a remote refresh merge.
    pub async fn fetch(&self) -> SyncResult<()> {
        self.engine.refresh().await
    }

    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        self.engine.attempt_sync().await
    }

    pub async fn reset(&self) -> SyncResult<()> {
        self.engine.reset().await
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Creates a task and returns it as currently published.
    ///
    /// The returned task carries the server id if the remote confirmed it
    /// right away, otherwise its temporary id.
    pub async fn add(&self, title: &str) -> SyncResult<Task> {
        let engine = &self.engine;
        let task = Task::new_local(title, Utc::now())?;

        let guard = engine.lock().await?;
        engine.store().upsert(&task).await?;

        if !engine.direct_write_allowed().await {
            let queued = engine
                .ledger()
                .enqueue(ChangeOperation::Add { task: task.clone() })
                .await;
            if let Err(e) = queued {
                if let Err(rollback) = engine.store().remove(&task.id).await {
                    error!(task_id = %task.id, error = %rollback, "Failed to roll back task");
                }
                return Err(e.into());
            }

            engine.publish_with(|tasks| prepend_task(tasks, &task));
            drop(guard);

            debug!(task_id = %task.id, "Task queued for creation");
            self.settle(true).await;
            return Ok(task);
        }

        engine.publish_with(|tasks| prepend_task(tasks, &task));

        let created = match engine.call_remote(engine.remote().create(&task.title)).await {
            Ok(remote) => {
                let confirmed = task.with_id(remote.id.as_str());
                match engine.store().replace_id(&task.id, &confirmed).await {
                    Ok(()) => {
                        engine.record_alias(&task.id, &confirmed.id);
                        engine.publish_with(|tasks| replace_task(tasks, &task.id, &confirmed));

                        info!(task_id = %task.id, server_id = %confirmed.id, "Task created remotely");
                        confirmed
                    }
                    Err(e) => {
                        // The drain moves it to the server id without a second create
                        let reason = format!("could not store server id {}: {}", remote.id, e);
                        let operation = ChangeOperation::Add { task: task.clone() };
                        match self.queue_after_failure(operation, &reason).await {
                            Ok(change) => engine.park_created(&change, remote),
                            Err(queue_err) => {
                                self.withdraw_add(&task).await;
                                return Err(queue_err);
                            }
                        }
                        task
                    }
                }
            }
            Err(e) => {
                let operation = ChangeOperation::Add { task: task.clone() };
                if let Err(queue_err) = self.queue_after_failure(operation, &e.to_string()).await {
                    self.withdraw_add(&task).await;
                    return Err(queue_err);
                }
                task
            }
        };

        drop(guard);
        self.settle(false).await;
        Ok(created)
    }

    /// Merges `patch` into the task and returns the published result.
    pub async fn edit(&self, id: &str, patch: TaskPatch) -> SyncResult<Task> {
        let engine = &self.engine;
        let patch = patch.validated()?;
        let (id, _loading) = self.track_resolved(id);

        let guard = engine.lock().await?;
        let (id, _loading) = self.recheck_resolved(id, _loading);
        let existing = engine
            .find(&id)
            .ok_or_else(|| SyncError::NotFound(id.clone()))?;
        if patch.is_empty() {
            return Ok(existing);
        }

        let updated = engine.store().update(&id, &patch).await?;

        if existing.is_local() || !engine.direct_write_allowed().await {
            let queued = engine
                .ledger()
                .enqueue(ChangeOperation::Update {
                    task: updated.clone(),
                })
                .await;
            if let Err(e) = queued {
                if let Err(rollback) = engine.store().upsert(&existing).await {
                    error!(task_id = %id, error = %rollback, "Failed to restore task");
                }
                return Err(e.into());
            }

            engine.publish_with(|tasks| replace_task(tasks, &id, &updated));
            drop(guard);

            debug!(task_id = %id, "Task edit queued");
            self.settle(true).await;
            return Ok(updated);
        }

        engine.publish_with(|tasks| replace_task(tasks, &id, &updated));

        let published = match engine.call_remote(engine.remote().update(&id, &patch)).await {
            Ok(RemoteAck::Applied(remote)) => {
                let confirmed = remote.into_task(Some(&updated), Utc::now());
                if confirmed == updated {
                    updated
                } else if let Err(e) = engine.store().upsert(&confirmed).await {
                    // The local edit stands; the next fetch brings the server copy
                    warn!(task_id = %id, error = %e, "Failed to store server copy of edit");
                    updated
                } else {
                    engine.publish_with(|tasks| replace_task(tasks, &id, &confirmed));
                    confirmed
                }
            }
            Ok(RemoteAck::NotFound) => {
                warn!(task_id = %id, "Remote no longer has the edited task");
                updated
            }
            Err(e) => {
                let operation = ChangeOperation::Update {
                    task: updated.clone(),
                };
                if let Err(queue_err) = self.queue_after_failure(operation, &e.to_string()).await {
                    if let Err(rollback) = engine.store().upsert(&existing).await {
                        error!(task_id = %id, error = %rollback, "Failed to restore task");
                    }
                    engine.publish_with(|tasks| replace_task(tasks, &id, &existing));
                    return Err(queue_err);
                }
                updated
            }
        };

        drop(guard);
        self.settle(false).await;
        Ok(published)
    }

    /// Removes a task.
    ///
    /// A task the remote never saw is withdrawn together with its queued
    /// changes, without contacting the remote.
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let engine = &self.engine;
        let (id, _loading) = self.track_resolved(id);

        let guard = engine.lock().await?;
        let (id, _loading) = self.recheck_resolved(id, _loading);
        let existing = engine
            .find(&id)
            .ok_or_else(|| SyncError::NotFound(id.clone()))?;

        if existing.is_local() {
            engine.store().remove(&id).await?;
            let withdrawn = engine.ledger().remove_for_task(&id).await?;
            engine.publish_with(|tasks| without_task(tasks, &id));
            drop(guard);

            debug!(task_id = %id, withdrawn, "Unsynced task withdrawn");
            self.settle(false).await;
            return Ok(());
        }

        if !engine.direct_write_allowed().await {
            let change = engine
                .ledger()
                .enqueue(ChangeOperation::Delete {
                    entity_id: id.clone(),
                })
                .await?;
            if let Err(e) = engine.store().remove(&id).await {
                if let Err(undo) = engine.ledger().remove(&change).await {
                    error!(task_id = %id, error = %undo, "Failed to withdraw queued delete");
                }
                return Err(e.into());
            }

            engine.publish_with(|tasks| without_task(tasks, &id));
            drop(guard);

            debug!(task_id = %id, "Task delete queued");
            self.settle(true).await;
            return Ok(());
        }

        let before = engine.snapshot();
        engine.store().remove(&id).await?;
        engine.publish_with(|tasks| without_task(tasks, &id));

        match engine.call_remote(engine.remote().delete(&id)).await {
            Ok(RemoteAck::Applied(())) => info!(task_id = %id, "Task deleted remotely"),
            Ok(RemoteAck::NotFound) => debug!(task_id = %id, "Remote task already gone"),
            Err(e) => {
                let operation = ChangeOperation::Delete {
                    entity_id: id.clone(),
                };
                if let Err(queue_err) = self.queue_after_failure(operation, &e.to_string()).await {
                    if let Err(rollback) = engine.store().upsert(&existing).await {
                        error!(task_id = %id, error = %rollback, "Failed to restore task");
                    }
                    engine.publish(before.as_ref().clone());
                    return Err(queue_err);
                }
            }
        }

        drop(guard);
        self.settle(false).await;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Parks a failed direct write in the ledger, already marked failed.
    ///
    /// An error means nothing was queued and the caller must undo its
    /// optimistic write.
    async fn queue_after_failure(
        &self,
        operation: ChangeOperation,
        reason: &str,
    ) -> SyncResult<PendingChange> {
        let kind = operation.kind();
        let task_id = operation.entity_id().to_string();
        warn!(kind = %kind, task_id = %task_id, reason, "Direct write incomplete, queueing");

        let ledger = self.engine.ledger();
        let change = ledger.enqueue(operation).await.map_err(|e| {
            error!(kind = %kind, task_id = %task_id, error = %e, "Failed to queue change");
            SyncError::from(e)
        })?;
        if let Err(e) = ledger.record_failure(&change, reason).await {
            warn!(change_id = %change.id, error = %e, "Failed to mark queued change as failed");
        }
        self.engine
            .set_error(format!("Failed to sync {} of task {}: {}", kind, task_id, reason));
        Ok(change)
    }

    /// Takes back an optimistic add nothing could be queued for.
    async fn withdraw_add(&self, task: &Task) {
        if let Err(e) = self.engine.store().remove(&task.id).await {
            error!(task_id = %task.id, error = %e, "Failed to roll back task");
        }
        self.engine
            .publish_with(|tasks| without_task(tasks, &task.id));
    }

    /// Runs after the mutation lock is released.
    async fn settle(&self, queued: bool) {
        self.engine.refresh_status().await;
        if queued && self.engine.can_sync() {
            if let Err(e) = self.engine.attempt_sync().await {
                debug!(error = %e, "Sync after mutation did not run");
            }
        }
    }

    /// Marks the row `id` refers to as loading, under its current id.
    fn track_resolved(&self, id: &str) -> (String, LoadingGuard) {
        let id = self.engine.resolve_id(id);
        let guard = self.track(&id);
        (id, guard)
    }

    /// Follows a confirmation that landed while waiting for the lock.
    fn recheck_resolved(&self, id: String, guard: LoadingGuard) -> (String, LoadingGuard) {
        let resolved = self.engine.resolve_id(&id);
        if resolved == id {
            (id, guard)
        } else {
            let moved = self.track(&resolved);
            drop(guard);
            (resolved, moved)
        }
    }

    fn track(&self, id: &str) -> LoadingGuard {
        self.loading
            .send_modify(|loading| *loading.entry(id.to_string()).or_insert(0) += 1);
        LoadingGuard {
            loading: Arc::clone(&self.loading),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("engine", &self.engine)
            .field("loading", &self.loading_ids())
            .finish()
    }
}

/// Keeps an id in the loading set until dropped.
struct LoadingGuard {
    loading: Arc<watch::Sender<LoadingMap>>,
    id: String,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.loading.send_modify(|loading| {
            if let Some(count) = loading.get_mut(&self.id) {
                *count -= 1;
                if *count == 0 {
                    loading.remove(&self.id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::test_support::Harness;
    use crate::RecordStore;
    use tasksync_core::{ChangeKind, ValidationError};

    async fn seeded(ids: &[&str]) -> Harness {
        let h = Harness::online().await;
        for id in ids {
            h.remote.seed(id, &format!("Task {}", id));
        }
        h.service.load_initial().await.unwrap();
        h
    }

    // =========================================================================
    // Offline
    // =========================================================================

    #[tokio::test]
    async fn test_offline_add_publishes_at_head_and_queues() {
        let h = Harness::offline().await;
        h.service.add("First").await.unwrap();
        let second = h.service.add("  Second  ").await.unwrap();

        let list = h.service.list();
        let titles: Vec<&str> = list.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);
        assert!(second.is_local());
        assert!(!second.completed);
        assert_eq!(h.ledger_len().await, 2);
        assert_eq!(h.store.get_all().await.len(), 2);
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.service.status(), SyncIndicator::Offline);
    }

    #[tokio::test]
    async fn test_invalid_title_never_reaches_storage() {
        let h = Harness::offline().await;

        assert!(matches!(
            h.service.add("   ").await,
            Err(SyncError::Validation(ValidationError::Required { .. }))
        ));
        assert!(matches!(
            h.service.add(&"x".repeat(101)).await,
            Err(SyncError::Validation(_))
        ));

        assert!(h.service.list().is_empty());
        assert!(h.store.get_all().await.is_empty());
        assert_eq!(h.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_list_unchanged() {
        let h = Harness::offline().await;
        let task = h.service.add("Keep me").await.unwrap();
        let before = h.service.list();

        h.store.fail_writes(true);
        assert!(matches!(
            h.service.add("Lost").await,
            Err(SyncError::Storage(_))
        ));
        assert!(matches!(
            h.service.edit(&task.id, TaskPatch::new().completed(true)).await,
            Err(SyncError::Storage(_))
        ));
        assert!(matches!(
            h.service.delete(&task.id).await,
            Err(SyncError::Storage(_))
        ));

        assert_eq!(h.service.list(), before);
        assert_eq!(h.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_offline_add_confirmed_after_recovery() {
        let h = Harness::offline().await;
        let task = h.service.add("Buy milk").await.unwrap();
        assert_eq!(h.ledger_len().await, 1);

        h.go_online().await;
        h.service.sync_now().await.unwrap();

        assert_eq!(h.ledger_len().await, 0);
        assert_eq!(h.ids(), vec!["201"]);
        assert_eq!(h.service.list()[0].title, "Buy milk");
        assert_eq!(h.service.list()[0].created_at, task.created_at);

        let stored = h.store.get_all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "201");
        assert_eq!(h.service.status(), SyncIndicator::Synced);
    }

    #[tokio::test]
    async fn test_add_then_edit_replays_in_order() {
        let h = Harness::offline().await;
        let task = h.service.add("Buy milk").await.unwrap();
        h.service
            .edit(&task.id, TaskPatch::new().title("Buy oat milk"))
            .await
            .unwrap();

        let kinds: Vec<ChangeKind> = h
            .engine
            .ledger()
            .drain()
            .await
            .unwrap()
            .iter()
            .map(|c| c.kind())
            .collect();
        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Update]);

        h.go_online().await;
        h.service.sync_now().await.unwrap();

        assert_eq!(h.remote.calls(), vec!["create Buy milk", "update 201"]);
        assert_eq!(h.remote.tasks()[0].title, "Buy oat milk");
        assert_eq!(h.ids(), vec!["201"]);
        assert_eq!(h.service.list()[0].title, "Buy oat milk");
        assert_eq!(h.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_edit_missing_task_is_not_found() {
        let h = Harness::offline().await;

        let result = h
            .service
            .edit("task_1", TaskPatch::new().title("Updated"))
            .await;
        assert!(matches!(result, Err(SyncError::NotFound(id)) if id == "task_1"));
        assert_eq!(h.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_edit_by_stale_temporary_id() {
        let h = Harness::online().await;
        h.remote.fail_next(1, RemoteError::Status { status: 500 });
        let task = h.service.add("Buy milk").await.unwrap();
        assert!(task.is_local());

        h.service.sync_now().await.unwrap();
        assert_eq!(h.ids(), vec!["201"]);

        let edited = h
            .service
            .edit(&task.id, TaskPatch::new().completed(true))
            .await
            .unwrap();
        assert_eq!(edited.id, "201");
        assert!(edited.completed);
        assert!(h.remote.tasks()[0].completed);
    }

    #[tokio::test]
    async fn test_double_delete_offline_queues_once() {
        let h = seeded(&["3"]).await;
        h.go_offline().await;

        h.service.delete("3").await.unwrap();
        assert!(matches!(
            h.service.delete("3").await,
            Err(SyncError::NotFound(_))
        ));

        let entries = h.engine.ledger().drain().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), ChangeKind::Delete);
        assert_eq!(entries[0].entity_id(), "3");
        assert!(h.service.list().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unsynced_task_withdraws_add() {
        let h = Harness::offline().await;
        let task = h.service.add("Never mind").await.unwrap();
        h.service
            .edit(&task.id, TaskPatch::new().completed(true))
            .await
            .unwrap();

        h.service.delete(&task.id).await.unwrap();
        assert!(h.service.list().is_empty());
        assert!(h.store.get_all().await.is_empty());
        assert_eq!(h.ledger_len().await, 0);

        h.go_online().await;
        h.service.sync_now().await.unwrap();
        assert!(h.remote.calls().is_empty());
    }

    // =========================================================================
    // Online
    // =========================================================================

    #[tokio::test]
    async fn test_online_add_confirms_immediately() {
        let h = Harness::online().await;
        let task = h.service.add("Buy milk").await.unwrap();

        assert_eq!(task.id, "201");
        assert_eq!(h.ids(), vec!["201"]);
        assert_eq!(h.store.get_all().await[0].id, "201");
        assert_eq!(h.ledger_len().await, 0);
        assert_eq!(h.remote.calls(), vec!["create Buy milk"]);
        assert_eq!(h.service.status(), SyncIndicator::Synced);
    }

    #[tokio::test]
    async fn test_online_failure_falls_back_to_ledger() {
        let h = Harness::online().await;
        h.remote.fail_next(1, RemoteError::Status { status: 500 });

        let task = h.service.add("Buy milk").await.unwrap();
        assert!(task.is_local());
        assert_eq!(h.ids(), vec![task.id.clone()]);

        let entries = h.engine.ledger().drain().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_count, 1);
        assert!(entries[0].has_error());
        assert!(h.service.last_error().is_some());
        assert_eq!(h.service.status(), SyncIndicator::SyncError { failed: 1 });

        h.service.sync_now().await.unwrap();
        assert_eq!(h.ids(), vec!["201"]);
        assert!(h.service.last_error().is_none());
        assert_eq!(h.service.status(), SyncIndicator::Synced);
    }

    #[tokio::test]
    async fn test_queued_changes_are_not_overtaken() {
        let h = seeded(&["1"]).await;
        h.go_offline().await;
        h.service.add("Other").await.unwrap();

        h.go_online().await;
        h.service
            .edit("1", TaskPatch::new().title("Renamed"))
            .await
            .unwrap();

        assert_eq!(
            h.remote.calls(),
            vec!["list", "create Other", "update 1"]
        );
        assert_eq!(h.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_update_replay_for_missing_remote_task_succeeds() {
        let h = seeded(&["2"]).await;
        h.go_offline().await;
        h.service
            .edit("2", TaskPatch::new().title("Updated"))
            .await
            .unwrap();

        h.remote.forget("2");
        h.go_online().await;
        h.service.sync_now().await.unwrap();

        assert_eq!(h.ledger_len().await, 0);
        assert!(h.service.last_error().is_none());
        assert_eq!(h.service.status(), SyncIndicator::Synced);
    }

    #[tokio::test]
    async fn test_delete_replay_for_missing_remote_task_succeeds() {
        let h = seeded(&["3"]).await;
        h.go_offline().await;
        h.service.delete("3").await.unwrap();

        h.remote.forget("3");
        h.go_online().await;
        h.service.sync_now().await.unwrap();

        assert_eq!(h.ledger_len().await, 0);
        assert!(h.service.last_error().is_none());
        assert!(h.remote.calls().contains(&"delete 3".to_string()));
    }

    #[tokio::test]
    async fn test_online_delete_calls_remote() {
        let h = seeded(&["4", "5"]).await;
        h.service.delete("4").await.unwrap();

        assert_eq!(h.ids(), vec!["5"]);
        assert_eq!(h.remote.tasks().len(), 1);
        assert_eq!(h.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_loading_ids_track_in_flight_edit() {
        let h = seeded(&["1"]).await;
        h.remote.hold();

        let service = h.service.clone();
        let edit = tokio::spawn(async move {
            service
                .edit("1", TaskPatch::new().completed(true))
                .await
        });
        h.remote.wait_for_calls(2).await;

        assert!(h.service.loading_ids().contains("1"));
        assert!(h.service.list()[0].completed);

        h.remote.open();
        let edited = edit.await.unwrap().unwrap();
        assert!(edited.completed);
        assert!(h.service.loading_ids().is_empty());
    }

    #[tokio::test]
    async fn test_loading_ids_follow_confirmed_id() {
        let h = Harness::online().await;
        h.remote.fail_next(1, RemoteError::Status { status: 500 });
        let task = h.service.add("Buy milk").await.unwrap();
        h.service.sync_now().await.unwrap();
        assert_eq!(h.ids(), vec!["201"]);

        h.remote.hold();
        let service = h.service.clone();
        let temp_id = task.id.clone();
        let edit = tokio::spawn(async move {
            service
                .edit(&temp_id, TaskPatch::new().completed(true))
                .await
        });
        h.remote.wait_for_calls(3).await;

        let loading = h.service.loading_ids();
        assert!(loading.contains("201"));
        assert!(!loading.contains(&task.id));

        h.remote.open();
        let edited = edit.await.unwrap().unwrap();
        assert_eq!(edited.id, "201");
        assert!(h.service.loading_ids().is_empty());
    }

    #[tokio::test]
    async fn test_unstored_server_id_is_settled_by_drain() {
        let h = Harness::online().await;
        h.store.fail_replace_id(true);

        let task = h.service.add("Buy milk").await.unwrap();
        assert!(task.is_local());
        assert_eq!(h.ids(), vec![task.id.clone()]);
        assert_eq!(h.ledger_len().await, 1);
        assert_eq!(h.remote.tasks().len(), 1);
        assert!(h.service.last_error().is_some());

        h.store.fail_replace_id(false);
        h.service.sync_now().await.unwrap();
        assert_eq!(h.ids(), vec!["201"]);
        assert_eq!(h.ledger_len().await, 0);
        assert_eq!(h.remote.calls(), vec!["create Buy milk"]);

        let stored: Vec<String> = h.store.get_all().await.into_iter().map(|t| t.id).collect();
        assert_eq!(stored, vec!["201"]);

        h.service.fetch().await.unwrap();
        assert_eq!(h.ids(), vec!["201"]);
    }

    #[tokio::test]
    async fn test_unqueueable_add_is_taken_back() {
        let h = Harness::online().await;
        h.remote.fail_next(1, RemoteError::Status { status: 500 });
        h.remote.hold();

        let service = h.service.clone();
        let add = tokio::spawn(async move { service.add("Buy milk").await });
        h.remote.wait_for_calls(1).await;
        assert_eq!(h.service.list().len(), 1);

        // Nothing can be queued once the database is gone
        h.db.close().await;
        h.remote.open();

        let result = add.await.unwrap();
        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert!(h.service.list().is_empty());
    }

    #[tokio::test]
    async fn test_unqueueable_edit_is_taken_back() {
        let h = seeded(&["1"]).await;
        h.remote.fail_next(1, RemoteError::Status { status: 500 });
        h.remote.hold();

        let service = h.service.clone();
        let edit = tokio::spawn(async move {
            service
                .edit("1", TaskPatch::new().title("Renamed"))
                .await
        });
        h.remote.wait_for_calls(2).await;
        assert_eq!(h.service.list()[0].title, "Renamed");

        h.db.close().await;
        h.remote.open();

        let result = edit.await.unwrap();
        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert_eq!(h.service.list()[0].title, "Task 1");
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let h = Harness::offline().await;
        h.service.add("One").await.unwrap();
        h.service.add("Two").await.unwrap();

        h.service.reset().await.unwrap();
        assert!(h.service.list().is_empty());
        assert!(h.store.get_all().await.is_empty());
        assert_eq!(h.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_operations_fail_after_shutdown() {
        let h = Harness::offline().await;
        h.service.shutdown().await;

        assert!(matches!(
            h.service.add("Too late").await,
            Err(SyncError::Disposed)
        ));
        assert!(matches!(h.service.fetch().await, Err(SyncError::Disposed)));
    }

    #[tokio::test]
    async fn test_fetch_offline_serves_record_store() {
        let h = Harness::offline().await;
        let cached = Task::new_local("Cached", Utc::now()).unwrap().with_id("9");
        h.store.upsert(&cached).await.unwrap();

        h.service.fetch().await.unwrap();
        assert_eq!(h.ids(), vec!["9"]);
        assert!(h.service.last_error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_last_error() {
        let h = seeded(&["1"]).await;
        h.remote.fail_next(1, RemoteError::Timeout { timeout_ms: 5_000 });

        h.service.fetch().await.unwrap();
        assert!(h.service.last_error().is_some());
        assert_eq!(h.ids(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_ids_stay_unique_across_fetches() {
        let h = seeded(&["1", "2"]).await;
        h.service.add("Created").await.unwrap();
        h.go_offline().await;
        h.service.add("Local").await.unwrap();
        h.go_online().await;

        h.service.fetch().await.unwrap();
        h.service.fetch().await.unwrap();

        let ids = h.ids();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| !id.starts_with("local_")));
    }
}
