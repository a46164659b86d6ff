//! # Network Monitor
//!
//! Periodically samples connectivity and publishes it as a watch value.
//!
//! ## Sampling Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        NetworkMonitor::run                              │
//! │                                                                         │
//! │   ┌──────────┐   probe (≤ probe_timeout)   ┌───────────────────────┐   │
//! │   │  sample  │ ──────────────────────────► │ watch<NetworkState>   │   │
//! │   └────┬─────┘                             │ (only on change)      │   │
//! │        │                                   └───────────────────────┘   │
//! │        ▼                                                                │
//! │   online?  ── yes ──► sleep online_interval  (30 s)                    │
//! │            ── no  ──► sleep offline_interval (3 s)                     │
//! │        │                                                                │
//! │        └──── shutdown received ──► stop                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use tasksync_core::{ConnectionType, NetworkState};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// One connectivity sample source.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn sample(&self) -> NetworkState;
}

// =============================================================================
// HTTP Probe
// =============================================================================

/// Counts the internet as reachable when the probe URL answers at all.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build probe client: {}", e)))?;

        Ok(HttpProbe {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(config.network.probe_url.clone(), config.probe_timeout())
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn sample(&self) -> NetworkState {
        match self.client.head(&self.url).send().await {
            // Any status code proves the route works
            Ok(_) => NetworkState::online(ConnectionType::Unknown),
            Err(e) if e.is_timeout() => NetworkState {
                is_connected: true,
                is_internet_reachable: false,
                connection_type: ConnectionType::Unknown,
            },
            Err(e) => {
                debug!(error = %e, "Reachability probe failed");
                NetworkState::offline()
            }
        }
    }
}

// =============================================================================
// Network Monitor
// =============================================================================

/// Owns the sampling loop and the current [`NetworkState`].
pub struct NetworkMonitor {
    probe: Arc<dyn NetworkProbe>,
    state: watch::Sender<NetworkState>,
    probe_timeout: Duration,
    online_interval: Duration,
    offline_interval: Duration,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl NetworkMonitor {
    /// Starts out offline until the first sample says otherwise.
    pub fn new(probe: Arc<dyn NetworkProbe>, config: &SyncConfig) -> Self {
        let (state, _) = watch::channel(NetworkState::offline());

        NetworkMonitor {
            probe,
            state,
            probe_timeout: config.probe_timeout(),
            online_interval: config.online_interval(),
            offline_interval: config.offline_interval(),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> NetworkState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Takes one sample now and publishes it if it changed.
    ///
    /// A probe that outlives the probe timeout counts as unreachable.
    pub async fn sample_now(&self) -> NetworkState {
        let sampled = match tokio::time::timeout(self.probe_timeout, self.probe.sample()).await {
            Ok(state) => state,
            Err(_) => {
                warn!(
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Reachability probe timed out"
                );
                NetworkState {
                    is_connected: self.current().is_connected,
                    is_internet_reachable: false,
                    connection_type: self.current().connection_type,
                }
            }
        };

        let changed = self.state.send_if_modified(|current| {
            if *current == sampled {
                false
            } else {
                *current = sampled;
                true
            }
        });
        if changed {
            info!(
                online = sampled.is_online(),
                connection_type = ?sampled.connection_type,
                "Network state changed"
            );
        }

        sampled
    }

    /// Spawns the sampling loop. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            debug!("Network monitor already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *slot = Some(shutdown_tx);
        tokio::spawn(Arc::clone(self).run(shutdown_rx));
    }

    /// Stops the sampling loop. In-flight probes are not aborted.
    pub async fn stop(&self) {
        let sender = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(()).await;
        }
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!("Network monitor started");

        loop {
            let state = self.sample_now().await;
            let wait = if state.is_online() {
                self.online_interval
            } else {
                self.offline_interval
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!("Network monitor stopped");
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("state", &self.current())
            .field("online_interval", &self.online_interval)
            .field("offline_interval", &self.offline_interval)
            .finish()
    }
}
