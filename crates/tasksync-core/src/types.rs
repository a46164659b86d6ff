//! # Domain Types
//!
//! Core domain types used throughout Tasksync.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Task       │   │   TaskPatch     │   │  NetworkState   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  title?         │   │  is_connected   │       │
//! │  │  title          │   │  completed?     │   │  is_internet_   │       │
//! │  │  completed      │   │  due_date??     │   │    reachable    │       │
//! │  │  created_at     │   │  reminder_*?    │   │  connection_    │       │
//! │  │  updated_at     │   │  updated_at?    │   │    type         │       │
//! │  │  due/reminder   │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                        ┌──────────────────────────────────────┐         │
//! │                        │ SyncIndicator                        │         │
//! │                        │ Offline | Syncing{n} | SyncError{n}  │         │
//! │                        │ | Synced                             │         │
//! │                        └──────────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Task Lifecycle
//! ```text
//! local-unconfirmed ──► pending-sync ──► synced
//!                                          │  edited while offline
//!                                          ▼
//!                                     pending-sync
//! delete: record removed entirely (no tombstone)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::ids::{is_local_id, mint_local_id};
use crate::validation::{validate_title, ValidationResult};

// =============================================================================
// Task
// =============================================================================

/// A user-editable task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Task {
    /// Temporary (`local_…`) or server-assigned id.
    pub id: String,

    /// Non-empty trimmed title, at most 100 characters.
    pub title: String,

    pub completed: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Monotonically non-decreasing per task.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub reminder_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub reminder_enabled: bool,
}

impl Task {
    /// Builds a new unconfirmed task with a freshly minted temporary id.
    ///
    /// The title is validated and trimmed; `completed` starts false.
    pub fn new_local(title: &str, now: DateTime<Utc>) -> ValidationResult<Self> {
        let title = validate_title(title)?;

        Ok(Task {
            id: mint_local_id(now),
            title,
            completed: false,
            created_at: now,
            updated_at: now,
            due_date: None,
            reminder_date: None,
            reminder_enabled: false,
        })
    }

    /// Returns true while the task still carries a temporary id.
    #[inline]
    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    /// Returns a copy of this task under another id.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            ..self.clone()
        }
    }

    /// Merges a patch into this task and bumps `updated_at`.
    ///
    /// `updated_at` never moves backwards, even if the wall clock does.
    pub fn apply(&self, patch: &TaskPatch, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();

        if let Some(ref title) = patch.title {
            next.title = title.clone();
        }
        if let Some(completed) = patch.completed {
            next.completed = completed;
        }
        if let Some(due_date) = patch.due_date {
            next.due_date = due_date;
        }
        if let Some(reminder_date) = patch.reminder_date {
            next.reminder_date = reminder_date;
        }
        if let Some(reminder_enabled) = patch.reminder_enabled {
            next.reminder_enabled = reminder_enabled;
        }

        let stamp = patch.updated_at.unwrap_or(now);
        next.updated_at = stamp.max(self.updated_at);
        next
    }
}

// =============================================================================
// Task Patch
// =============================================================================

/// Partial update of a task.
///
/// `None` leaves a field untouched. For the optional dates `Some(None)` clears
/// the field, which serializes as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub reminder_date: Option<Option<DateTime<Utc>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Distinguishes an explicit `null` (clear) from an absent field (keep).
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn due_date(mut self, due_date: Option<DateTime<Utc>>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn reminder(mut self, reminder_date: Option<DateTime<Utc>>, enabled: bool) -> Self {
        self.reminder_date = Some(reminder_date);
        self.reminder_enabled = Some(enabled);
        self
    }

    /// Full snapshot of every mutable field, used when replaying an update.
    pub fn from_task(task: &Task) -> Self {
        TaskPatch {
            title: Some(task.title.clone()),
            completed: Some(task.completed),
            due_date: Some(task.due_date),
            reminder_date: Some(task.reminder_date),
            reminder_enabled: Some(task.reminder_enabled),
            updated_at: Some(task.updated_at),
        }
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.reminder_date.is_none()
            && self.reminder_enabled.is_none()
    }

    /// Validates the patch and trims the title, if present.
    pub fn validated(mut self) -> ValidationResult<Self> {
        if let Some(ref title) = self.title {
            self.title = Some(validate_title(title)?);
        }
        Ok(self)
    }
}

// =============================================================================
// Network State
// =============================================================================

/// Connection medium. Informational only; never used to decide sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Other,
    None,
    #[default]
    Unknown,
}

/// One sample of device connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NetworkState {
    pub is_connected: bool,
    pub is_internet_reachable: bool,
    pub connection_type: ConnectionType,
}

impl NetworkState {
    /// A state that counts as online.
    pub fn online(connection_type: ConnectionType) -> Self {
        NetworkState {
            is_connected: true,
            is_internet_reachable: true,
            connection_type,
        }
    }

    /// A state with no connectivity at all.
    pub fn offline() -> Self {
        NetworkState {
            is_connected: false,
            is_internet_reachable: false,
            connection_type: ConnectionType::None,
        }
    }

    /// Online for sync purposes requires both flags.
    #[inline]
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable
    }
}

// =============================================================================
// Sync Indicator
// =============================================================================

/// User-visible sync status, derived purely from network state and the
/// ledger contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "state", rename_all = "snake_case")]
#[ts(export)]
pub enum SyncIndicator {
    Offline,
    Syncing { pending: usize },
    SyncError { failed: usize },
    Synced,
}

impl SyncIndicator {
    /// Derives the indicator.
    ///
    /// ```text
    /// offline?          → Offline
    /// failed entries?   → SyncError { failed }
    /// pending entries?  → Syncing { pending }
    /// otherwise         → Synced
    /// ```
    pub fn derive(online: bool, pending: usize, failed: usize) -> Self {
        if !online {
            SyncIndicator::Offline
        } else if failed > 0 {
            SyncIndicator::SyncError { failed }
        } else if pending > 0 {
            SyncIndicator::Syncing { pending }
        } else {
            SyncIndicator::Synced
        }
    }
}

impl Default for SyncIndicator {
    fn default() -> Self {
        SyncIndicator::Offline
    }
}

impl std::fmt::Display for SyncIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncIndicator::Offline => write!(f, "offline"),
            SyncIndicator::Syncing { pending } => write!(f, "syncing {} changes", pending),
            SyncIndicator::SyncError { failed } => write!(f, "sync error on {} changes", failed),
            SyncIndicator::Synced => write!(f, "fully synced"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
