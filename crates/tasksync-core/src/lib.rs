//! # tasksync-core: Pure Domain Logic for Tasksync
//!
//! This crate is the **heart** of Tasksync. It holds the task model, the
//! pending-change model and the reconciliation rules as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tasksync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI / CLI                                     │   │
//! │  │    list ──► add ──► edit ──► delete ──► refresh                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tasksync-sync (TaskService, SyncEngine, Ledger)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tasksync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐   │   │
//! │  │   │   types   │  │  change   │  │   merge   │  │ validation│   │   │
//! │  │   │   Task    │  │ Pending   │  │  remote ∪ │  │   title   │   │   │
//! │  │   │ TaskPatch │  │  Change   │  │  local    │  │   rules   │   │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tasksync-db (Database Layer)                    │   │
//! │  │          SQLite tasks table, pending_changes table              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Task, TaskPatch, NetworkState, SyncIndicator
//! - [`change`] - PendingChange and its replayable operation
//! - [`ids`] - Temporary id minting and detection
//! - [`merge`] - Deterministic remote/local reconciliation
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use tasksync_core::{Task, TaskPatch};
//!
//! let task = Task::new_local("  Buy milk ", Utc::now()).unwrap();
//! assert_eq!(task.title, "Buy milk");
//! assert!(task.is_local());
//!
//! let done = task.apply(&TaskPatch::new().completed(true), Utc::now());
//! assert!(done.completed);
//! assert!(done.updated_at >= task.updated_at);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod change;
pub mod error;
pub mod ids;
pub mod merge;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use change::{ChangeKind, ChangeOperation, PendingChange};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ids::{is_local_id, mint_local_id, LOCAL_ID_PREFIX};
pub use merge::{dedupe_by_id, merge_remote, PendingMarkers};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum task title length, counted in characters after trimming.
pub const MAX_TITLE_LENGTH: usize = 100;
