//! # Remote Service Contract
//!
//! The opaque CRUD interface over the remote source of truth.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list()            → [RemoteTask]              Err on non-2xx          │
//! │  create(title)     → RemoteTask                server assigns the id   │
//! │  update(id, patch) → Applied(RemoteTask)                               │
//! │                    | NotFound                  404, replay succeeded   │
//! │  delete(id)        → Applied(()) | NotFound    404, replay succeeded   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations report transport and status failures as [`RemoteError`];
//! the engine bounds every call with its own timeout on top.

use async_trait::async_trait;

use tasksync_core::TaskPatch;

pub use crate::error::RemoteError;
use crate::protocol::RemoteTask;

/// Outcome of an update or delete that tolerates a missing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAck<T> {
    /// The remote applied the change.
    Applied(T),

    /// The remote has no record with that id. The desired end state already
    /// holds, so this counts as success.
    NotFound,
}

impl<T> RemoteAck<T> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteAck::NotFound)
    }

    /// The applied value, if any.
    pub fn applied(self) -> Option<T> {
        match self {
            RemoteAck::Applied(value) => Some(value),
            RemoteAck::NotFound => None,
        }
    }
}

/// CRUD access to the remote task list of one user.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Every remote task of the configured user, in remote order.
    async fn list(&self) -> Result<Vec<RemoteTask>, RemoteError>;

    /// Creates a task; the returned record carries the server-assigned id.
    async fn create(&self, title: &str) -> Result<RemoteTask, RemoteError>;

    /// Applies a partial update.
    async fn update(&self, id: &str, patch: &TaskPatch)
        -> Result<RemoteAck<RemoteTask>, RemoteError>;

    /// Deletes a task.
    async fn delete(&self, id: &str) -> Result<RemoteAck<()>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_helpers() {
        let applied: RemoteAck<u32> = RemoteAck::Applied(7);
        assert!(!applied.is_not_found());
        assert_eq!(applied.applied(), Some(7));

        let missing: RemoteAck<u32> = RemoteAck::NotFound;
        assert!(missing.is_not_found());
        assert_eq!(missing.applied(), None);
    }
}
