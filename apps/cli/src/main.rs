//! # Tasksync CLI
//!
//! One-shot commands over the local task list. Every invocation samples the
//! network once, so mutations made offline are queued and replayed by the
//! next invocation that finds the remote reachable.
//!
//! ## Lifecycle of one command
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  config (TOML + env) ──► SQLite ──► probe once ──► load_initial        │
//! │                                                        │                │
//! │                                                        ▼                │
//! │                                              run command ──► shutdown   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tasksync_core::{Task, TaskPatch};
use tasksync_db::{Database, DbConfig};
use tasksync_sync::{
    EngineSettings, HttpProbe, HttpRemoteService, NetworkMonitor, PendingChangeLedger,
    SkipReason, SqliteRecordStore, SyncConfig, SyncEngine, SyncOutcome, TaskService,
};

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "Offline-first task list with background sync")]
#[command(version)]
struct Cli {
    /// Config file path (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the task list
    List,

    /// Add a task
    Add {
        /// Task title
        title: String,
    },

    /// Edit a task
    Edit {
        /// Task id (temporary or server id)
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        /// Mark as completed
        #[arg(long, conflicts_with = "undone")]
        done: bool,

        /// Mark as not completed
        #[arg(long)]
        undone: bool,

        /// Due date, RFC 3339 (e.g. 2026-01-31T09:00:00Z)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        /// Reminder date, RFC 3339; enables the reminder
        #[arg(long, conflicts_with = "clear_reminder")]
        remind: Option<DateTime<Utc>>,

        /// Remove the reminder
        #[arg(long)]
        clear_reminder: bool,
    },

    /// Delete a task
    Delete {
        /// Task id (temporary or server id)
        id: String,
    },

    /// Replay pending changes, then merge a fresh remote listing
    Refresh,

    /// Replay pending changes only
    Sync,

    /// Show network, ledger and database status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = SyncConfig::load(cli.config).context("Failed to load configuration")?;
    let path = database_path(&config)?;
    let db = Database::new(DbConfig::new(path.clone()))
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;

    let probe = HttpProbe::from_config(&config).context("Invalid reachability probe")?;
    let monitor = Arc::new(NetworkMonitor::new(Arc::new(probe), &config));
    let engine = Arc::new(SyncEngine::new(
        Arc::new(SqliteRecordStore::new(&db)),
        PendingChangeLedger::new(&db),
        Arc::new(HttpRemoteService::from_config(&config).context("Invalid remote service")?),
        monitor.clone(),
        EngineSettings::from_config(&config),
    ));
    let service = TaskService::new(engine);

    let network = monitor.sample_now().await;
    info!(online = network.is_online(), "Network sampled");

    let result = run(cli.command, &service, &db).await;

    service.shutdown().await;
    db.close().await;
    result
}

async fn run(
    command: Commands,
    service: &TaskService,
    db: &Database,
) -> Result<()> {
    if !matches!(command, Commands::Sync | Commands::Status) {
        service
            .load_initial()
            .await
            .context("Failed to load the task list")?;
    }

    match command {
        Commands::List => print_tasks(&service.list()),

        Commands::Add { title } => {
            let task = service.add(&title).await?;
            println!("Added {}", task.id);
        }

        Commands::Edit {
            id,
            title,
            done,
            undone,
            due,
            clear_due,
            remind,
            clear_reminder,
        } => {
            let mut patch = TaskPatch::new();
            if let Some(title) = title {
                patch = patch.title(title);
            }
            if done || undone {
                patch = patch.completed(done);
            }
            if due.is_some() || clear_due {
                patch = patch.due_date(due);
            }
            if remind.is_some() || clear_reminder {
                patch = patch.reminder(remind, remind.is_some());
            }
            if patch.is_empty() {
                bail!("nothing to edit; pass --title, --done, --due, ...");
            }

            let task = service
                .edit(&id, patch)
                .await
                .with_context(|| format!("Failed to edit {}", id))?;
            print_tasks(std::slice::from_ref(&task));
        }

        Commands::Delete { id } => {
            service
                .delete(&id)
                .await
                .with_context(|| format!("Failed to delete {}", id))?;
            println!("Deleted {}", id);
        }

        Commands::Refresh => {
            service.fetch().await?;
            println!("{} tasks", service.list().len());
        }

        Commands::Sync => match service.sync_now().await? {
            SyncOutcome::Skipped(SkipReason::Offline) => println!("Offline, nothing sent"),
            SyncOutcome::Skipped(SkipReason::Disabled) => println!("Sync is disabled"),
            SyncOutcome::Coalesced => println!("Sync already running"),
            SyncOutcome::Completed(report) => println!(
                "Replayed {} changes in {} passes{}",
                report.replayed,
                report.passes,
                if report.aborted { " (stopped on error)" } else { "" }
            ),
        },

        Commands::Status => {
            let engine = service.engine();
            let status = engine.refresh_status().await;
            let ledger = engine.ledger();
            let (total, applied) = db.migration_status().await?;

            println!("status:     {}", status);
            println!("pending:    {}", ledger.pending_count().await?);
            println!("failed:     {}", ledger.failed_count().await?);
            println!("database:   {}", if db.health_check().await { "ok" } else { "unhealthy" });
            println!("migrations: {}/{}", applied, total);

            for change in ledger.drain().await? {
                if let Some(ref error) = change.error {
                    println!(
                        "  {} {} (retries: {}) {}",
                        change.kind(),
                        change.entity_id(),
                        change.retry_count,
                        error
                    );
                }
            }
        }
    }

    if let Some(error) = service.last_error() {
        warn!(%error, "Sync problem");
    }
    Ok(())
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks");
        return;
    }

    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        let pending = if task.is_local() { " *" } else { "" };
        let due = task
            .due_date
            .map(|d| format!("  (due {})", d.format("%Y-%m-%d %H:%M")))
            .unwrap_or_default();
        println!("[{}] {:<28} {}{}{}", mark, task.id, task.title, due, pending);
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tasksync_sync=trace` - Trace the sync layer only
/// - Default: INFO level, sqlx at WARN
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves the database file and creates its directory.
///
/// Set `TASKSYNC_DATABASE_PATH` (or `storage.database_path`) to override the
/// platform data directory.
fn database_path(config: &SyncConfig) -> Result<PathBuf> {
    let path = config
        .database_path()
        .context("Could not determine app data directory")?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(path)
}
