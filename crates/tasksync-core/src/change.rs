//! # Pending Changes
//!
//! A [`PendingChange`] is one not-yet-confirmed mutation waiting in the
//! ledger.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Pending Change Lifecycle                             │
//! │                                                                         │
//! │  mutation while offline ──┐                                             │
//! │  (or direct write failed) │                                             │
//! │                           ▼                                             │
//! │                  ┌─────────────────┐                                    │
//! │                  │    enqueued     │  retry_count = 0                   │
//! │                  └────────┬────────┘                                    │
//! │                           │ drain (oldest first)                        │
//! │              ┌────────────┴────────────┐                                │
//! │              ▼                         ▼                                │
//! │     replay confirmed          replay failed                             │
//! │     (or remote 404 on         retry_count += 1                          │
//! │      update/delete)           last_retry, error set                     │
//! │              │                pass aborts, entry stays                  │
//! │              ▼                                                          │
//! │          removed                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::types::Task;

// =============================================================================
// Change Kind
// =============================================================================

/// The three replayable mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ChangeKind::Add),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            other => Err(ValidationError::InvalidFormat {
                field: "kind".to_string(),
                reason: format!("unknown change kind '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Change Operation
// =============================================================================

/// Payload needed to replay a mutation against the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeOperation {
    /// Create the task remotely; the server assigns the real id.
    Add { task: Task },

    /// Push the full mutable state of the task.
    Update { task: Task },

    /// Remove the task remotely.
    #[serde(rename_all = "camelCase")]
    Delete { entity_id: String },
}

impl ChangeOperation {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeOperation::Add { .. } => ChangeKind::Add,
            ChangeOperation::Update { .. } => ChangeKind::Update,
            ChangeOperation::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Id of the task this operation targets.
    pub fn entity_id(&self) -> &str {
        match self {
            ChangeOperation::Add { task } | ChangeOperation::Update { task } => &task.id,
            ChangeOperation::Delete { entity_id } => entity_id,
        }
    }

    pub fn task(&self) -> Option<&Task> {
        match self {
            ChangeOperation::Add { task } | ChangeOperation::Update { task } => Some(task),
            ChangeOperation::Delete { .. } => None,
        }
    }

    /// Retargets the operation from one task id to another.
    ///
    /// Used once a temporary id has been confirmed under a server id.
    pub fn rekeyed(&self, from: &str, to: &str) -> Self {
        if self.entity_id() != from {
            return self.clone();
        }

        match self {
            ChangeOperation::Add { task } => ChangeOperation::Add {
                task: task.with_id(to),
            },
            ChangeOperation::Update { task } => ChangeOperation::Update {
                task: task.with_id(to),
            },
            ChangeOperation::Delete { .. } => ChangeOperation::Delete {
                entity_id: to.to_string(),
            },
        }
    }
}

// =============================================================================
// Pending Change
// =============================================================================

/// A ledger entry.
///
/// `id` is the ledger identity used for removal; two entries for the same
/// task never share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub id: String,
    pub operation: ChangeOperation,
    /// Creation time; replay order is ascending by this field.
    pub timestamp: DateTime<Utc>,
    pub retry_count: i64,
    pub last_retry: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PendingChange {
    /// Creates a fresh entry with zeroed retry bookkeeping.
    pub fn new(operation: ChangeOperation, now: DateTime<Utc>) -> Self {
        PendingChange {
            id: Uuid::new_v4().to_string(),
            operation,
            timestamp: now,
            retry_count: 0,
            last_retry: None,
            error: None,
        }
    }

    pub fn add(task: Task, now: DateTime<Utc>) -> Self {
        Self::new(ChangeOperation::Add { task }, now)
    }

    pub fn update(task: Task, now: DateTime<Utc>) -> Self {
        Self::new(ChangeOperation::Update { task }, now)
    }

    pub fn delete(entity_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(
            ChangeOperation::Delete {
                entity_id: entity_id.into(),
            },
            now,
        )
    }

    #[inline]
    pub fn kind(&self) -> ChangeKind {
        self.operation.kind()
    }

    #[inline]
    pub fn entity_id(&self) -> &str {
        self.operation.entity_id()
    }

    /// True if the last replay attempt of this entry failed.
    #[inline]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
