//! In-crate fakes for the collaborator seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use tasksync_core::{ConnectionType, NetworkState, Task, TaskPatch};
use tasksync_db::{Database, DbConfig, DbError, DbResult};

use crate::config::SyncConfig;
use crate::engine::{EngineSettings, SyncEngine};
use crate::ledger::PendingChangeLedger;
use crate::network::{NetworkMonitor, NetworkProbe};
use crate::protocol::RemoteTask;
use crate::remote::{RemoteAck, RemoteError, RemoteService};
use crate::service::TaskService;
use crate::store::{RecordStore, SqliteRecordStore};

// =============================================================================
// Fake Remote
// =============================================================================

#[derive(Debug, Default)]
struct FakeState {
    tasks: Vec<RemoteTask>,
    next_id: u64,
    failures: VecDeque<RemoteError>,
    calls: Vec<String>,
}

/// In-memory remote with scripted failures and an optional call gate.
#[derive(Debug)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    /// Server ids start at 201, like JSONPlaceholder.
    pub fn new() -> Self {
        FakeRemote {
            state: Mutex::new(FakeState {
                next_id: 201,
                ..FakeState::default()
            }),
            gate: Mutex::new(None),
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn seed(&self, id: &str, title: &str) {
        self.state().tasks.push(RemoteTask::new(id, title, false));
    }

    /// Drops a record behind the client's back, as another device would.
    pub fn forget(&self, id: &str) {
        self.state().tasks.retain(|t| t.id != id);
    }

    /// Fails the next `n` calls with `err`.
    pub fn fail_next(&self, n: usize, err: RemoteError) {
        let mut state = self.state();
        for _ in 0..n {
            state.failures.push_back(err.clone());
        }
    }

    /// Blocks every call until [`FakeRemote::open`].
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Removes the gate and lets all waiting calls through.
    pub fn open(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn tasks(&self) -> Vec<RemoteTask> {
        self.state().tasks.clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Polls until `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..500 {
            if self.started() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {} remote calls, saw {}", n, self.started());
    }

    async fn enter(&self, call: String) -> Result<CallGuard<'_>, RemoteError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let guard = CallGuard { remote: self };

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.state();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(guard),
        }
    }
}

struct CallGuard<'a> {
    remote: &'a FakeRemote,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.remote.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn list(&self) -> Result<Vec<RemoteTask>, RemoteError> {
        let _call = self.enter("list".to_string()).await?;
        Ok(self.tasks())
    }

    async fn create(&self, title: &str) -> Result<RemoteTask, RemoteError> {
        let _call = self.enter(format!("create {}", title)).await?;
        let mut state = self.state();
        let task = RemoteTask::new(state.next_id.to_string(), title, false);
        state.next_id += 1;
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<RemoteAck<RemoteTask>, RemoteError> {
        let _call = self.enter(format!("update {}", id)).await?;
        let mut state = self.state();
        match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                if let Some(ref title) = patch.title {
                    task.title = title.clone();
                }
                if let Some(completed) = patch.completed {
                    task.completed = completed;
                }
                Ok(RemoteAck::Applied(task.clone()))
            }
            None => Ok(RemoteAck::NotFound),
        }
    }

    async fn delete(&self, id: &str) -> Result<RemoteAck<()>, RemoteError> {
        let _call = self.enter(format!("delete {}", id)).await?;
        let mut state = self.state();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        if state.tasks.len() == before {
            Ok(RemoteAck::NotFound)
        } else {
            Ok(RemoteAck::Applied(()))
        }
    }
}

// =============================================================================
// Failing Store
// =============================================================================

/// SQLite store whose writes can be switched to fail.
pub struct FailingStore {
    inner: SqliteRecordStore,
    fail_writes: AtomicBool,
    fail_replace_id: AtomicBool,
}

impl FailingStore {
    pub fn new(db: &Database) -> Self {
        FailingStore {
            inner: SqliteRecordStore::new(db),
            fail_writes: AtomicBool::new(false),
            fail_replace_id: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails only the temporary-to-server id swap.
    pub fn fail_replace_id(&self, fail: bool) {
        self.fail_replace_id.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> DbResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(DbError::QueryFailed("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn get_all(&self) -> Vec<Task> {
        self.inner.get_all().await
    }

    async fn upsert(&self, task: &Task) -> DbResult<()> {
        self.check()?;
        self.inner.upsert(task).await
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> DbResult<Task> {
        self.check()?;
        self.inner.update(id, patch).await
    }

    async fn replace_id(&self, from_id: &str, confirmed: &Task) -> DbResult<()> {
        self.check()?;
        if self.fail_replace_id.load(Ordering::SeqCst) {
            return Err(DbError::Constraint("UNIQUE constraint failed: tasks.id".into()));
        }
        self.inner.replace_id(from_id, confirmed).await
    }

    async fn replace_all(&self, tasks: &[Task]) -> DbResult<()> {
        self.check()?;
        self.inner.replace_all(tasks).await
    }

    async fn remove(&self, id: &str) -> DbResult<bool> {
        self.check()?;
        self.inner.remove(id).await
    }

    async fn clear(&self) -> DbResult<()> {
        self.check()?;
        self.inner.clear().await
    }
}

// =============================================================================
// Scripted Probe
// =============================================================================

/// Probe that reports whatever the test sets.
#[derive(Debug)]
pub struct ScriptedProbe {
    online: AtomicBool,
    delay: Mutex<Duration>,
    samples: AtomicUsize,
}

impl ScriptedProbe {
    pub fn offline() -> Self {
        ScriptedProbe {
            online: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            samples: AtomicUsize::new(0),
        }
    }

    pub fn online() -> Self {
        let probe = Self::offline();
        probe.set_online(true);
        probe
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkProbe for ScriptedProbe {
    async fn sample(&self) -> NetworkState {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.online.load(Ordering::SeqCst) {
            NetworkState::online(ConnectionType::Wifi)
        } else {
            NetworkState::offline()
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fully wired facade over in-memory SQLite and the fakes above.
pub struct Harness {
    pub db: Database,
    pub store: Arc<FailingStore>,
    pub remote: Arc<FakeRemote>,
    pub probe: Arc<ScriptedProbe>,
    pub monitor: Arc<NetworkMonitor>,
    pub engine: Arc<SyncEngine>,
    pub service: TaskService,
}

impl Harness {
    pub async fn offline() -> Self {
        Self::with_config(SyncConfig::default()).await
    }

    pub async fn with_config(config: SyncConfig) -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let store = Arc::new(FailingStore::new(&db));
        let remote = Arc::new(FakeRemote::new());
        let probe = Arc::new(ScriptedProbe::offline());
        let monitor = Arc::new(NetworkMonitor::new(probe.clone(), &config));

        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            PendingChangeLedger::new(&db),
            remote.clone(),
            monitor.clone(),
            EngineSettings::from_config(&config),
        ));
        let service = TaskService::new(engine.clone());

        Harness {
            db,
            store,
            remote,
            probe,
            monitor,
            engine,
            service,
        }
    }

    pub async fn online() -> Self {
        let harness = Self::offline().await;
        harness.go_online().await;
        harness
    }

    /// Flips the probe and takes a sample so the engine sees it now.
    pub async fn go_online(&self) {
        self.probe.set_online(true);
        self.monitor.sample_now().await;
    }

    pub async fn go_offline(&self) {
        self.probe.set_online(false);
        self.monitor.sample_now().await;
    }

    pub async fn ledger_len(&self) -> usize {
        self.engine.ledger().pending_count().await.unwrap()
    }

    pub fn ids(&self) -> Vec<String> {
        self.service.list().iter().map(|t| t.id.clone()).collect()
    }
}
