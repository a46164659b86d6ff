//! # tasksync-db: Database Layer for Tasksync
//!
//! This crate provides durable local storage for Tasksync: the task records
//! and the pending change ledger. It uses SQLite with sqlx for async
//! operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tasksync Data Flow                               │
//! │                                                                         │
//! │  TaskService / SyncEngine (tasksync-sync)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tasksync-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ TaskRepo       │   │ 001_init.sql │   │   │
//! │  │   │ SqlitePool    │◄───│ PendingChange  │   │              │   │   │
//! │  │   │               │    │   Repo         │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <platform data dir>/tasks.db                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Task and pending change repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tasksync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tasks.db")).await?;
//!
//! let tasks = db.tasks().get_all().await?;
//! let pending = db.pending_changes().count_pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::pending::PendingChangeRepository;
pub use repository::task::TaskRepository;
