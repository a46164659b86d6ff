//! # Sync Error Types
//!
//! Error types for the sync layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Caller input   │  │    Storage      │  │     Remote              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Storage        │  │  Remote(RemoteError)    │ │
//! │  │  NotFound       │  │                 │  │  NetworkUnavailable     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │         surfaced to the caller          absorbed into the ledger and   │
//! │         synchronously                   reported through last_error    │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Configuration  │  │   Lifecycle     │                              │
//! │  │                 │  │                 │                              │
//! │  │  InvalidConfig  │  │  Disposed       │                              │
//! │  │  ConfigLoad…    │  │  Internal       │                              │
//! │  │  ConfigSave…    │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use tasksync_core::{CoreError, ValidationError};
use tasksync_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Remote Error
// =============================================================================

/// Failure of one Remote Service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The service answered with a non-2xx status.
    #[error("Remote returned HTTP {status}")]
    Status { status: u16 },

    /// The call did not settle within the request timeout.
    #[error("Remote call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The service could not be reached at all.
    #[error("Remote unreachable: {0}")]
    Connection(String),

    /// The response body could not be mapped into a task.
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    /// Returns true for `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { status: 404 })
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Errors surfaced by the task facade and sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// Invalid input, rejected before any write.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Task id absent from the current in-memory state.
    #[error("Task not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Durable read or write failed; the operation was aborted.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Remote Service call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No remote attempt was made because the device is offline.
    #[error("Network unavailable")]
    NetworkUnavailable,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The engine was shut down; no further work is accepted.
    #[error("Sync engine has been shut down")]
    Disposed,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TaskNotFound(id) => SyncError::NotFound(id),
            CoreError::Validation(v) => SyncError::Validation(v),
            CoreError::InvalidChange(msg) => SyncError::Internal(msg),
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidConfig(format!("invalid URL: {}", err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later sync attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable
                | SyncError::Remote(RemoteError::Timeout { .. })
                | SyncError::Remote(RemoteError::Connection(_))
                | SyncError::Remote(RemoteError::Status { .. })
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
