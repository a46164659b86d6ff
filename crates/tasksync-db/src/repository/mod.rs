//! # Repository Module
//!
//! Database repository implementations for Tasksync.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  TaskRepository (tasks table)          PendingChangeRepository          │
//! │  ├── get_all()                         (pending_changes table)          │
//! │  ├── get_by_id(id)                     ├── enqueue(change)              │
//! │  ├── upsert(task)                      ├── list_ordered()               │
//! │  ├── update(id, patch)                 ├── remove(id)                   │
//! │  ├── replace_all(tasks)                ├── remove_for_entity(task_id)   │
//! │  ├── remove(id)                        ├── rekey(from, to)              │
//! │  └── clear()                           ├── record_failure(id, error)    │
//! │                                        └── clear()                      │
//! │       │                                        │                        │
//! │       └──────────────── SQL ───────────────────┘                        │
//! │                          ▼                                              │
//! │                   SQLite Database                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`task::TaskRepository`] - Durable task records
//! - [`pending::PendingChangeRepository`] - Durable pending change ledger

pub mod pending;
pub mod task;
