//! # Database Handle
//!
//! Opens the SQLite file that backs both the record store and the ledger.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new("…/tasks.db")          DbConfig::in_memory()            │
//! │    WAL journal, NORMAL sync            one connection, never recycled  │
//! │    up to 4 connections                 (the data dies with it)         │
//! │              │                                   │                      │
//! │              └────────────────┬──────────────────┘                      │
//! │                               ▼                                         │
//! │                 Database::new ──► embedded migrations                   │
//! │                               │                                         │
//! │              ┌────────────────┴──────────────────┐                      │
//! │              ▼                                   ▼                      │
//! │        db.tasks()                       db.pending_changes()            │
//! │        `tasks` table                    `pending_changes` table         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A file database keeps more than one connection so a drain can read the
//! ledger while a facade write holds another connection.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::pending::PendingChangeRepository;
use crate::repository::task::TaskRepository;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

/// How to open the database.
///
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("/path/to/tasks.db").busy_timeout(Duration::from_secs(2))).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,

    pub max_connections: u32,

    /// How long a writer waits for SQLite's lock before failing.
    pub busy_timeout: Duration,

    pub migrate: bool,
}

impl DbConfig {
    /// A database file, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: DbLocation::File(path.into()),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    /// A private in-memory database, for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            location: DbLocation::Memory,
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Skips the embedded migrations on open.
    pub fn without_migrations(mut self) -> Self {
        self.migrate = false;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == DbLocation::Memory
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.location {
            DbLocation::Memory => SqliteConnectOptions::new().in_memory(true),
            DbLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        };
        options.busy_timeout(self.busy_timeout)
    }

    fn describe(&self) -> String {
        match &self.location {
            DbLocation::Memory => ":memory:".to_string(),
            DbLocation::File(path) => path.display().to_string(),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the pool; clones are cheap.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_in_memory() {
            // The schema lives in this one connection
            pool_options = pool_options
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            location = %config.describe(),
            max_connections = config.max_connections,
            "Database opened"
        );

        let db = Database { pool };
        if config.migrate {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Opens a file database with the default settings.
    pub async fn open(path: &Path) -> DbResult<Self> {
        Self::new(DbConfig::new(path)).await
    }

    /// Applies any migrations not yet recorded. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// `(total, applied)` migration counts.
    pub async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The record store table.
    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.pool.clone())
    }

    /// The ledger table.
    pub fn pending_changes(&self) -> PendingChangeRepository {
        PendingChangeRepository::new(self.pool.clone())
    }

    /// Repository calls fail after this.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database closed");
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = db.migration_status().await.unwrap();
        assert!(total >= 1);
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_unmigrated_database_reports_pending() {
        let db = Database::new(DbConfig::in_memory().without_migrations())
            .await
            .unwrap();
        let (total, applied) = db.migration_status().await.unwrap();
        assert!(total >= 1);
        assert_eq!(applied, 0);

        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
        let (total, applied) = db.migration_status().await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_closed_database_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_opens() {
        let path = std::env::temp_dir().join(format!(
            "tasksync-pool-{}-{}.db",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let db = Database::open(&path).await.unwrap();
        sqlx::query("INSERT INTO tasks (id, title, completed, created_at, updated_at, reminder_enabled, position) VALUES ('1', 'kept', 0, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', 0, 0)")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        let db = Database::open(&path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        db.close().await;

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/tasks.db")
            .max_connections(0)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
