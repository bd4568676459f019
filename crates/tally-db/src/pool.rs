//! # Database Pool
//!
//! Opens the SQLite file behind the durable store and applies migrations.
//!
//! ```text
//! DbConfig::new(path) ──► Database::new(config) ──► SqlitePool (WAL)
//!                                  │
//!                                  ├──► migrations::run_migrations
//!                                  ▼
//!                          db.kv() ──► KvRepository ──► kv_store
//! ```
//!
//! The engine writes at most two small documents per operation, so the pool
//! stays small. WAL lets a reader (e.g. `tally status` in another shell)
//! proceed while a write is in progress.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::kv::KvRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Default: 4. In-memory databases always use 1.
    pub max_connections: u32,

    /// How long a writer waits on a locked database. Default: 5 seconds.
    pub busy_timeout: Duration,

    /// Default: true.
    pub run_migrations: bool,
}

impl DbConfig {
    /// Configuration for a file database. The file is created on connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// A private database that disappears with the pool. Used by tests.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            ..Self::new(IN_MEMORY)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY)
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };
        Ok(options.busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the store database. Clones share the pool.
///
/// Implements [`DurableStore`](crate::store::DurableStore).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects and, unless disabled, migrates.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening database");

        let mut pool_options = SqlitePoolOptions::new();
        if config.is_in_memory() {
            // Each connection would get its own empty database.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(Option::<Duration>::None)
                .max_lifetime(Option::<Duration>::None);
        } else {
            pool_options = pool_options.max_connections(config.max_connections.max(1));
        }

        let pool = pool_options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(max_connections = config.max_connections, "Pool ready");

        let db = Database { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    pub fn kv(&self) -> KvRepository {
        KvRepository::new(self.pool.clone())
    }

    /// Waits for open connections to finish, then closes the pool.
    pub async fn close(&self) {
        debug!("Closing database pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.kv().set("queue", "[]").await.unwrap();
        // A second handle shares the single in-memory connection.
        let other = db.clone();
        assert_eq!(other.kv().get("queue").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert!(path.exists());

        db.kv().set("cache", "[]").await.unwrap();
        db.close().await;
        assert!(db.kv().get("cache").await.is_err());

        let reopened = Database::new(DbConfig::new(&path)).await.unwrap();
        assert_eq!(reopened.kv().get("cache").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_migrations_can_be_skipped() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        assert!(db.kv().get("cache").await.is_err());
    }

    #[test]
    fn test_config() {
        let config = DbConfig::new("/tmp/tally.db").max_connections(8);
        assert_eq!(config.max_connections, 8);
        assert!(config.run_migrations);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
