//! SQLite-backed store.
//!
//! Split into focused submodules:
//! - `tasks` — task CRUD, paginated fetch, bulk status updates
//! - `orders` — order CRUD, filtered pagination, duplicate-pending probe
//! - `dialogue` — conversation context, pending confirmations, pagination cursors

pub mod dialogue;
mod orders;
mod tasks;

use chrono::{DateTime, NaiveDateTime, Utc};
use quipu_core::{config::MemoryConfig, error::QuipuError, shellexpand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Persistent store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new store, running migrations on first use.
    ///
    /// A `db_path` of `:memory:` opens an in-memory database (used by tests).
    pub async fn new(config: &MemoryConfig) -> Result<Self, QuipuError> {
        let db_path = shellexpand(&config.db_path);

        let url = if db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            // Ensure parent directory exists.
            if let Some(parent) = std::path::Path::new(&db_path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| QuipuError::Store(format!("failed to create data dir: {e}")))?;
            }
            format!("sqlite:{db_path}")
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| QuipuError::Store(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let max_connections = if db_path == ":memory:" { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(|e| QuipuError::Store(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("Store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), QuipuError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| QuipuError::Store(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] = &[
            ("001_init", include_str!("../../migrations/001_init.sql")),
            (
                "002_dialogue_state",
                include_str!("../../migrations/002_dialogue_state.sql"),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        QuipuError::Store(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| QuipuError::Store(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    QuipuError::Store(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }
}

/// Format a timestamp the way SQLite's `datetime('now')` does, so stored
/// values compare cleanly against it.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a stored timestamp back into UTC. Tolerates both the `datetime()`
/// format and RFC 3339 leftovers.
pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
