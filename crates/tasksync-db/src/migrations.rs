//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied on open, oldest first.
//!
//! ```text
//! 001_initial_schema.sql   tasks, pending_changes
//! ```
//!
//! Applied migrations are recorded in `_sqlx_migrations`. A shipped file is
//! never edited; schema changes go into a new `NNN_description.sql`.

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every migration not yet recorded.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    debug!(total = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(total, applied)`. A database that was never migrated reports zero
/// applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| {
        warn!(error = %e, "Migration table unavailable");
        0
    });

    Ok((total, applied.max(0) as usize))
}
