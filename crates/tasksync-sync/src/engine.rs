//! # Sync Engine
//!
//! Keeps the in-memory list, the record store and the ledger consistent, and
//! brings them into agreement with the remote whenever connectivity exists.
//!
//! ## Drain Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         attempt_sync()                                  │
//! │                                                                         │
//! │   in_flight? ── yes ──► set rerun, return Coalesced                    │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │   ┌──────────────────────── pass ───────────────────────────────────┐  │
//! │   │  snapshot ledger (oldest first)                                 │  │
//! │   │  for each entry:                                                │  │
//! │   │     resolve temp id aliases                                     │  │
//! │   │     replay against remote        (no lock held, ≤ timeout)      │  │
//! │   │     ├─ ok / 404 ──► apply under the mutation lock, remove entry │  │
//! │   │     └─ error    ──► stamp entry, abort pass                     │  │
//! │   └─────────────────────────────────────────────────────────────────┘  │
//! │       │                                                                 │
//! │   rerun requested? ── yes ──► one more pass                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Triggers
//! - every queued mutation made while online
//! - a network transition from offline to online
//! - the optional periodic tick
//!
//! Results that arrive after [`SyncEngine::shutdown`] or [`SyncEngine::reset`]
//! are discarded.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tasksync_core::{
    dedupe_by_id, is_local_id, merge_remote, ChangeKind, ChangeOperation, NetworkState,
    PendingChange, PendingMarkers, SyncIndicator, Task, TaskPatch,
};

use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::ledger::PendingChangeLedger;
use crate::network::NetworkMonitor;
use crate::protocol::RemoteTask;
use crate::remote::{RemoteAck, RemoteService};
use crate::store::RecordStore;

// =============================================================================
// Settings & Outcomes
// =============================================================================

/// Engine knobs taken from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// When false the remote is never contacted.
    pub sync_enabled: bool,

    /// Upper bound for one remote call.
    pub request_timeout: Duration,

    pub periodic_interval: Option<Duration>,
}

impl EngineSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        EngineSettings {
            sync_enabled: config.is_sync_enabled(),
            request_timeout: config.request_timeout(),
            periodic_interval: config.periodic_interval(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Why a sync attempt did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    Disabled,
}

/// Totals over the passes run by one [`SyncEngine::attempt_sync`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub passes: usize,
    pub replayed: usize,

    /// True if the last pass stopped before reaching the end of the ledger.
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),

    /// Another drain was in flight; it will run one more pass.
    Coalesced,

    Completed(DrainReport),
}

#[derive(Debug, Clone, Copy, Default)]
struct PassResult {
    replayed: usize,
    aborted: bool,
}

/// What the remote said about one replayed entry.
enum Replayed {
    Created(RemoteTask),
    Updated(RemoteAck<RemoteTask>),
    Deleted(RemoteAck<()>),
}

/// Clears the in-flight flag even if the drain future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Orchestrates store, ledger, remote and network state.
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    ledger: PendingChangeLedger,
    remote: Arc<dyn RemoteService>,
    monitor: Arc<NetworkMonitor>,
    settings: EngineSettings,

    /// Whole-list snapshots; never mutated in place.
    tasks: watch::Sender<Arc<Vec<Task>>>,
    status: watch::Sender<SyncIndicator>,
    last_error: watch::Sender<Option<String>>,

    /// Serializes facade mutations and the application of replay results.
    mutation_lock: Mutex<()>,

    /// Temporary id → server id, for callers holding a stale id.
    aliases: StdMutex<HashMap<String, String>>,

    /// Creates the remote accepted but that could not be applied locally,
    /// by ledger entry id. Replaying the entry reuses the result.
    unapplied: StdMutex<HashMap<String, RemoteTask>>,

    in_flight: AtomicBool,
    rerun: AtomicBool,
    disposed: AtomicBool,

    /// Bumped by reset; results from an older generation are dropped.
    generation: AtomicU64,

    shutdown_tx: StdMutex<Option<mpsc::Sender<()>>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: PendingChangeLedger,
        remote: Arc<dyn RemoteService>,
        monitor: Arc<NetworkMonitor>,
        settings: EngineSettings,
    ) -> Self {
        let (tasks, _) = watch::channel(Arc::new(Vec::new()));
        let (status, _) = watch::channel(SyncIndicator::Offline);
        let (last_error, _) = watch::channel(None);

        SyncEngine {
            store,
            ledger,
            remote,
            monitor,
            settings,
            tasks,
            status,
            last_error,
            mutation_lock: Mutex::new(()),
            aliases: StdMutex::new(HashMap::new()),
            unapplied: StdMutex::new(HashMap::new()),
            in_flight: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            shutdown_tx: StdMutex::new(None),
        }
    }

    // =========================================================================
    // Read Side
    // =========================================================================

    /// The current task list.
    pub fn snapshot(&self) -> Arc<Vec<Task>> {
        self.tasks.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Task>>> {
        self.tasks.subscribe()
    }

    pub fn status(&self) -> SyncIndicator {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncIndicator> {
        self.status.subscribe()
    }

    /// Aggregate error of the most recent failed remote interaction.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// True when the remote may be contacted right now.
    pub fn can_sync(&self) -> bool {
        self.settings.sync_enabled && self.monitor.is_online()
    }

    pub fn ledger(&self) -> &PendingChangeLedger {
        &self.ledger
    }

    // =========================================================================
    // Facade Plumbing
    // =========================================================================

    pub(crate) fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub(crate) fn remote(&self) -> &dyn RemoteService {
        self.remote.as_ref()
    }

    /// Takes the mutation lock, failing once the engine is shut down.
    pub(crate) async fn lock(&self) -> SyncResult<MutexGuard<'_, ()>> {
        let guard = self.mutation_lock.lock().await;
        self.ensure_live()?;
        Ok(guard)
    }

    pub(crate) fn ensure_live(&self) -> SyncResult<()> {
        if self.is_disposed() {
            Err(SyncError::Disposed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn find(&self, id: &str) -> Option<Task> {
        self.tasks.borrow().iter().find(|t| t.id == id).cloned()
    }

    /// Direct remote writes are allowed only when nothing older is queued.
    pub(crate) async fn direct_write_allowed(&self) -> bool {
        if !self.can_sync() {
            return false;
        }
        match self.ledger.is_empty().await {
            Ok(empty) => empty,
            Err(e) => {
                warn!(error = %e, "Could not inspect ledger, queueing instead");
                false
            }
        }
    }

    /// Publishes a whole new list. Ignored after shutdown.
    pub(crate) fn publish(&self, tasks: Vec<Task>) {
        if self.is_disposed() {
            warn!("Discarding task list update after shutdown");
            return;
        }
        self.tasks.send_replace(Arc::new(dedupe_by_id(tasks)));
    }

    pub(crate) fn publish_with(&self, next: impl FnOnce(&[Task]) -> Vec<Task>) {
        let current = self.snapshot();
        self.publish(next(&current));
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.last_error.send_replace(Some(message));
    }

    fn clear_error(&self) {
        self.last_error.send_if_modified(|current| current.take().is_some());
    }

    /// Clears the aggregate error once no ledger entry carries a failure.
    async fn settle_error(&self) {
        match self.ledger.failed_count().await {
            Ok(0) => self.clear_error(),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not count failed changes"),
        }
    }

    pub(crate) fn record_alias(&self, from: &str, to: &str) {
        let mut aliases = self
            .aliases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        aliases.insert(from.to_string(), to.to_string());
    }

    /// Maps a confirmed temporary id to its server id.
    pub(crate) fn resolve_id(&self, id: &str) -> String {
        self.alias_for(id).unwrap_or_else(|| id.to_string())
    }

    fn alias_for(&self, id: &str) -> Option<String> {
        let aliases = self
            .aliases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        aliases.get(id).cloned()
    }

    /// Keeps a create result for the queued `add` that will apply it.
    pub(crate) fn park_created(&self, change: &PendingChange, remote: RemoteTask) {
        debug!(change_id = %change.id, server_id = %remote.id, "Parking unapplied create");
        self.unapplied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(change.id.clone(), remote);
    }

    fn take_created(&self, change: &PendingChange) -> Option<RemoteTask> {
        self.unapplied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&change.id)
    }

    /// Runs one remote call under the request timeout.
    pub(crate) async fn call_remote<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match tokio::time::timeout(self.settings.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                timeout_ms: self.settings.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.is_disposed() && self.generation.load(Ordering::SeqCst) == generation
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Recomputes the indicator from network state and ledger contents.
    pub async fn refresh_status(&self) -> SyncIndicator {
        let counts = match self.ledger.pending_count().await {
            Ok(pending) => self.ledger.failed_count().await.map(|failed| (pending, failed)),
            Err(e) => Err(e),
        };

        let (pending, failed) = match counts {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Could not read ledger for status");
                return self.status();
            }
        };

        let indicator = SyncIndicator::derive(self.can_sync(), pending, failed);
        self.status.send_if_modified(|current| {
            if *current == indicator {
                false
            } else {
                *current = indicator;
                true
            }
        });
        indicator
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Replays the ledger against the remote.
    ///
    /// At most one drain runs at a time. Triggers arriving meanwhile are
    /// folded into a single follow-up pass.
    pub async fn attempt_sync(&self) -> SyncResult<SyncOutcome> {
        self.ensure_live()?;
        if !self.settings.sync_enabled {
            return Ok(SyncOutcome::Skipped(SkipReason::Disabled));
        }
        if !self.monitor.is_online() {
            self.refresh_status().await;
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }

        let mut report = DrainReport::default();
        loop {
            // Announce before competing so an owner releasing right now sees it
            self.rerun.store(true, Ordering::SeqCst);
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                if report.passes == 0 {
                    debug!("Drain in flight, coalescing trigger");
                    return Ok(SyncOutcome::Coalesced);
                }
                return Ok(SyncOutcome::Completed(report));
            }

            let guard = InFlight(&self.in_flight);
            while self.rerun.swap(false, Ordering::SeqCst) {
                if !self.can_sync() || self.is_disposed() {
                    break;
                }
                let pass = self.drain_pass().await;
                report.passes += 1;
                report.replayed += pass.replayed;
                report.aborted = pass.aborted;
            }
            drop(guard);

            if !self.rerun.load(Ordering::SeqCst) {
                break;
            }
        }

        Ok(SyncOutcome::Completed(report))
    }

    async fn drain_pass(&self) -> PassResult {
        let generation = self.generation.load(Ordering::SeqCst);
        let entries = match self.ledger.drain().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to read pending changes");
                self.set_error(format!("Failed to read pending changes: {}", e));
                return PassResult {
                    replayed: 0,
                    aborted: true,
                };
            }
        };

        if !entries.is_empty() {
            info!(pending = entries.len(), "Draining pending changes");
        }

        let mut result = PassResult::default();
        for entry in entries {
            if !self.can_sync() || !self.is_current(generation) {
                debug!("Drain interrupted");
                result.aborted = true;
                break;
            }

            let entry = self.resolve_entry(entry);
            if entry.kind() != ChangeKind::Add && is_local_id(entry.entity_id()) {
                // The remote never saw this task and no add is queued for it
                warn!(
                    change_id = %entry.id,
                    task_id = %entry.entity_id(),
                    "Dropping change for a task that was never created remotely"
                );
                if let Err(e) = self.ledger.remove(&entry).await {
                    error!(change_id = %entry.id, error = %e, "Failed to drop orphaned change");
                }
                continue;
            }

            let replayed = match self.replay(&entry).await {
                Ok(replayed) => replayed,
                Err(e) => {
                    warn!(
                        change_id = %entry.id,
                        kind = %entry.kind(),
                        task_id = %entry.entity_id(),
                        error = %e,
                        "Replay failed, leaving change queued"
                    );
                    if let Err(db) = self.ledger.record_failure(&entry, &e.to_string()).await {
                        error!(change_id = %entry.id, error = %db, "Failed to record replay failure");
                    }
                    self.set_error(format!(
                        "Failed to sync {} of task {}: {}",
                        entry.kind(),
                        entry.entity_id(),
                        e
                    ));
                    result.aborted = true;
                    break;
                }
            };

            match self.apply_replayed(&entry, replayed, generation).await {
                Ok(true) => result.replayed += 1,
                Ok(false) => {
                    result.aborted = true;
                    break;
                }
                Err(e) => {
                    error!(change_id = %entry.id, error = %e, "Failed to apply confirmed change");
                    self.set_error(format!("Failed to apply synced change: {}", e));
                    result.aborted = true;
                    break;
                }
            }
        }

        if !result.aborted {
            self.settle_error().await;
        }
        self.refresh_status().await;

        if result.replayed > 0 {
            info!(replayed = result.replayed, aborted = result.aborted, "Drain pass finished");
        }
        result
    }

    /// Retargets an update or delete whose temporary id was confirmed after
    /// the ledger snapshot was taken.
    fn resolve_entry(&self, entry: PendingChange) -> PendingChange {
        if entry.kind() == ChangeKind::Add {
            return entry;
        }

        let from = entry.entity_id().to_string();
        match self.alias_for(&from) {
            Some(to) => PendingChange {
                operation: entry.operation.rekeyed(&from, &to),
                ..entry
            },
            None => entry,
        }
    }

    async fn replay(&self, change: &PendingChange) -> Result<Replayed, RemoteError> {
        match &change.operation {
            ChangeOperation::Add { task } => {
                if let Some(remote) = self.take_created(change) {
                    debug!(change_id = %change.id, server_id = %remote.id, "Create already accepted");
                    return Ok(Replayed::Created(remote));
                }
                self.call_remote(self.remote.create(&task.title))
                    .await
                    .map(Replayed::Created)
            }
            ChangeOperation::Update { task } => {
                let patch = TaskPatch::from_task(task);
                self.call_remote(self.remote.update(&task.id, &patch))
                    .await
                    .map(Replayed::Updated)
            }
            ChangeOperation::Delete { entity_id } => self
                .call_remote(self.remote.delete(entity_id))
                .await
                .map(Replayed::Deleted),
        }
    }

    /// Applies one confirmed replay. Returns false if the result was stale.
    async fn apply_replayed(
        &self,
        change: &PendingChange,
        replayed: Replayed,
        generation: u64,
    ) -> SyncResult<bool> {
        let _lock = self.mutation_lock.lock().await;
        if !self.is_current(generation) {
            warn!(change_id = %change.id, "Discarding replay result after reset or shutdown");
            return Ok(false);
        }

        match replayed {
            Replayed::Created(remote) => self.confirm_add(change, remote).await?,
            Replayed::Updated(RemoteAck::Applied(remote)) => {
                self.confirm_update(change, remote).await?
            }
            Replayed::Updated(RemoteAck::NotFound) | Replayed::Deleted(RemoteAck::NotFound) => {
                debug!(
                    change_id = %change.id,
                    task_id = %change.entity_id(),
                    "Remote has no such task, replay counts as done"
                );
                self.ledger.remove(change).await?;
            }
            Replayed::Deleted(RemoteAck::Applied(())) => {
                self.ledger.remove(change).await?;
            }
        }
        Ok(true)
    }

    /// Moves a confirmed task to its server id.
    ///
    /// The store and the list change first. The ledger entry goes last, in
    /// the same transaction that retargets later entries, so a failure at any
    /// step leaves the `add` queued and the create result parked.
    async fn confirm_add(&self, change: &PendingChange, remote: RemoteTask) -> SyncResult<()> {
        let local_id = change.entity_id().to_string();
        let server_id = remote.id.clone();

        if !self.ledger.contains(change).await? {
            // Deleted locally while the create was in flight
            info!(
                task_id = %local_id,
                server_id = %server_id,
                "Add withdrawn during replay, queueing remote delete"
            );
            self.ledger
                .enqueue(ChangeOperation::Delete {
                    entity_id: server_id,
                })
                .await?;
            self.rerun.store(true, Ordering::SeqCst);
            return Ok(());
        }

        // Absent under both ids: the list was reloaded without it
        let local = match self.find(&local_id) {
            Some(local) => Some(local),
            None if self.find(&server_id).is_some() => None,
            None => change.operation.task().cloned(),
        };
        if let Some(local) = local {
            let confirmed = local.with_id(server_id.as_str());
            if let Err(e) = self.store.replace_id(&local_id, &confirmed).await {
                self.park_created(change, remote);
                return Err(e.into());
            }
            self.publish_with(|tasks| replace_task(tasks, &local_id, &confirmed));
        }
        self.record_alias(&local_id, &server_id);

        if let Err(e) = self.ledger.confirm_add(change, &server_id).await {
            self.park_created(change, remote);
            return Err(e.into());
        }

        info!(task_id = %local_id, server_id = %server_id, "Task confirmed by remote");
        Ok(())
    }

    async fn confirm_update(&self, change: &PendingChange, remote: RemoteTask) -> SyncResult<()> {
        let id = change.entity_id().to_string();
        self.ledger.remove(change).await?;

        if !self.ledger.entries_for(&id).await?.is_empty() {
            debug!(task_id = %id, "Newer local changes queued, keeping local copy");
            return Ok(());
        }

        let Some(local) = self.find(&id) else {
            return Ok(());
        };
        let confirmed = remote.into_task(Some(&local), Utc::now());
        if confirmed != local {
            self.store.upsert(&confirmed).await?;
            self.publish_with(|tasks| replace_task(tasks, &id, &confirmed));
        }
        Ok(())
    }

    // =========================================================================
    // Loading & Refresh
    // =========================================================================

    /// Publishes the record store right away, then merges a remote listing
    /// if online.
    pub async fn load_initial(&self) -> SyncResult<()> {
        {
            let _lock = self.lock().await?;
            let tasks = self.store.get_all().await;
            info!(count = tasks.len(), "Loaded tasks from record store");
            self.publish(tasks);
        }

        self.refresh_status().await;
        if self.can_sync() {
            self.refresh().await
        } else {
            Ok(())
        }
    }

    /// Drains the ledger, then merges a fresh remote listing.
    ///
    /// Offline this republishes the record store. Remote failures are
    /// reported through [`SyncEngine::last_error`].
    pub async fn refresh(&self) -> SyncResult<()> {
        self.ensure_live()?;

        if !self.can_sync() {
            debug!("Offline, serving tasks from the record store");
            {
                let _lock = self.lock().await?;
                let tasks = self.store.get_all().await;
                self.publish(tasks);
            }
            self.refresh_status().await;
            return Ok(());
        }

        self.attempt_sync().await?;

        let generation = self.generation.load(Ordering::SeqCst);
        let listing = match self.call_remote(self.remote.list()).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "Remote refresh failed");
                self.set_error(format!("Failed to fetch tasks: {}", e));
                self.refresh_status().await;
                return Ok(());
            }
        };

        {
            let _lock = self.mutation_lock.lock().await;
            if !self.is_current(generation) {
                warn!("Discarding remote listing after reset or shutdown");
                return Ok(());
            }

            let pending = self.ledger.drain().await?;
            let markers = PendingMarkers::from_changes(&pending);
            let local = self.snapshot();
            let local_by_id: HashMap<&str, &Task> =
                local.iter().map(|t| (t.id.as_str(), t)).collect();

            let now = Utc::now();
            let remote: Vec<Task> = listing
                .into_iter()
                .map(|r| {
                    let existing = local_by_id.get(r.id.as_str()).copied();
                    r.into_task(existing, now)
                })
                .collect();

            let merged = merge_remote(&local, remote, &markers);
            self.store.replace_all(&merged).await?;
            info!(count = merged.len(), "Merged remote tasks");
            self.publish(merged);
        }

        self.settle_error().await;
        self.refresh_status().await;
        Ok(())
    }

    /// Clears the record store, the ledger and the in-memory list.
    pub async fn reset(&self) -> SyncResult<()> {
        {
            let _lock = self.lock().await?;
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.store.clear().await?;
            self.ledger.clear().await?;
            self.aliases
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
            self.unapplied
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
            self.publish(Vec::new());
            self.clear_error();
        }

        self.refresh_status().await;
        info!("Local task state reset");
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the network monitor and the sync trigger watcher.
    pub fn start(self: &Arc<Self>) {
        if self.is_disposed() {
            warn!("Sync engine already shut down, not starting");
            return;
        }

        let mut slot = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            debug!("Sync engine already running");
            return;
        }

        self.monitor.start();

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *slot = Some(shutdown_tx);
        // Transitions are judged against the state seen at start
        let network = self.monitor.subscribe();
        let was_online = network.borrow().is_online();
        tokio::spawn(Arc::clone(self).watch_triggers(network, was_online, shutdown_rx));

        info!(
            sync_enabled = self.settings.sync_enabled,
            periodic_secs = self.settings.periodic_interval.map(|p| p.as_secs()),
            "Sync engine started"
        );
    }

    /// Stops background work. Outstanding remote calls are not aborted, but
    /// their results are discarded.
    pub async fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sender = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(()).await;
        }
        self.monitor.stop().await;

        info!("Sync engine shut down");
    }

    async fn watch_triggers(
        self: Arc<Self>,
        mut network: watch::Receiver<NetworkState>,
        mut was_online: bool,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = self.settings.periodic_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = network.borrow_and_update().is_online();
                    self.refresh_status().await;

                    if online && !was_online {
                        info!("Network restored, syncing pending changes");
                        self.spawn_sync();
                    }
                    was_online = online;
                }

                _ = next_tick(&mut ticker) => {
                    debug!("Periodic sync tick");
                    self.spawn_sync();
                }

                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!("Sync trigger watcher stopped");
    }

    fn spawn_sync(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.attempt_sync().await {
                debug!(error = %e, "Background sync did not run");
            }
        });
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("settings", &self.settings)
            .field("status", &self.status())
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// =============================================================================
// List Helpers
// =============================================================================

/// `task` at the head, followed by everything else.
pub(crate) fn prepend_task(tasks: &[Task], task: &Task) -> Vec<Task> {
    let mut next = Vec::with_capacity(tasks.len() + 1);
    next.push(task.clone());
    next.extend(tasks.iter().filter(|t| t.id != task.id).cloned());
    next
}

/// Swaps the record at `id` for `task`, keeping its position.
pub(crate) fn replace_task(tasks: &[Task], id: &str, task: &Task) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.id == id || t.id != task.id)
        .map(|t| if t.id == id { task.clone() } else { t.clone() })
        .collect()
}

pub(crate) fn without_task(tasks: &[Task], id: &str) -> Vec<Task> {
    tasks.iter().filter(|t| t.id != id).cloned().collect()
}
