//! # tasksync-sync: Sync Layer for Tasksync
//!
//! This crate lets task mutations succeed immediately while offline and
//! replays them against the remote service once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Layer Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 TaskService (public operation surface)           │  │
//! │  │                                                                  │  │
//! │  │  add / edit / delete / fetch / loading_ids / last_error          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                 SyncEngine (orchestrator)                        │  │
//! │  │                                                                  │  │
//! │  │  watch<Arc<Vec<Task>>>   watch<SyncIndicator>   mutation lock    │  │
//! │  │  drain: one at a time, follow-up passes coalesced                │  │
//! │  └───────┬──────────────────┬──────────────────┬────────────────────┘  │
//! │          ▼                  ▼                  ▼                        │
//! │  ┌────────────────┐ ┌────────────────┐ ┌────────────────────────┐      │
//! │  │  RecordStore   │ │ PendingChange  │ │  RemoteService         │      │
//! │  │                │ │ Ledger         │ │                        │      │
//! │  │ SQLite tasks   │ │ SQLite FIFO of │ │ HttpRemoteService      │      │
//! │  │ table          │ │ unsynced edits │ │ (reqwest, ≤ 5 s)       │      │
//! │  └────────────────┘ └────────────────┘ └────────────────────────┘      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  NetworkMonitor: probe every 30 s online, every 3 s offline     │   │
//! │  │  offline → online transition triggers a drain                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`service`] - `TaskService`, the mutation entry point
//! - [`engine`] - `SyncEngine`, ledger drain and remote merge
//! - [`ledger`] - Durable pending change log
//! - [`store`] - Record store seam and its SQLite adapter
//! - [`remote`] - Remote service contract
//! - [`http`] - REST implementation of the remote contract
//! - [`protocol`] - Remote wire format and mapping into `Task`
//! - [`network`] - Connectivity probe and polling monitor
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tasksync_db::{Database, DbConfig};
//! use tasksync_sync::{
//!     EngineSettings, HttpProbe, HttpRemoteService, NetworkMonitor, PendingChangeLedger,
//!     SqliteRecordStore, SyncConfig, SyncEngine, TaskService,
//! };
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("tasks.db")).await?;
//!
//! let monitor = Arc::new(NetworkMonitor::new(
//!     Arc::new(HttpProbe::from_config(&config)?),
//!     &config,
//! ));
//! let engine = Arc::new(SyncEngine::new(
//!     Arc::new(SqliteRecordStore::new(&db)),
//!     PendingChangeLedger::new(&db),
//!     Arc::new(HttpRemoteService::from_config(&config)?),
//!     monitor,
//!     EngineSettings::from_config(&config),
//! ));
//!
//! let tasks = TaskService::new(engine);
//! tasks.start();
//! tasks.load_initial().await?;
//! tasks.add("Buy milk").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod ledger;
pub mod network;
pub mod protocol;
pub mod remote;
pub mod service;
pub mod store;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{NetworkSettings, RemoteSettings, StorageSettings, SyncConfig, SyncSettings};
pub use engine::{DrainReport, EngineSettings, SkipReason, SyncEngine, SyncOutcome};
pub use error::{RemoteError, SyncError, SyncResult};
pub use http::HttpRemoteService;
pub use ledger::PendingChangeLedger;
pub use network::{HttpProbe, NetworkMonitor, NetworkProbe};
pub use protocol::{RemoteId, RemoteTask};
pub use remote::{RemoteAck, RemoteService};
pub use service::TaskService;
pub use store::{RecordStore, SqliteRecordStore};
