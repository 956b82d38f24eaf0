//! # Local Database Module
//!
//! SQLite storage behind the durable request queue. The database survives
//! process restarts; rows are only deleted once a replay is confirmed.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool and schema management
//! - `schema.rs`: versioned migrations
//! - `queue.rs`: row-level operations on `pending_requests` and `sync_metadata`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync::client::local_db::LocalDatabase;
//!
//! # async fn example() -> sqlx::Result<()> {
//! let db = LocalDatabase::open("/tmp/offline-sync/queue.db").await?;
//! let stats = db.get_stats().await?;
//! println!("{} requests waiting", stats.pending_requests);
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod schema;

pub use queue::PendingRow;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Result as SqlxResult, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Result type for local database operations
pub type Result<T> = SqlxResult<T>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open the database at the platform default location
    pub async fn new() -> Result<Self> {
        Self::open(Self::default_db_path()).await
    }

    /// Open or create the database file at `path`
    ///
    /// Uses WAL mode so readers never block the writer.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::debug!("[Queue] Opened local database at {}", path.display());
        Self::from_pool(pool).await
    }

    /// Open a private in-memory database
    ///
    /// The pool is pinned to a single connection that is never recycled,
    /// since every new SQLite memory connection starts out empty.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Platform-specific path for the queue database
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("offline-sync");
        path.push("queue.db");
        path
    }

    /// Apply any migrations newer than the recorded schema version
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version = self.schema_version().await?;
        if !schema::needs_migration(current_version) {
            return Ok(());
        }

        for (version, statements) in schema::get_pending_migrations(current_version) {
            let mut tx = self.pool.begin().await?;
            for statement in statements {
                sqlx::query(*statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!("[Queue] Applied schema migration {}", version);
        }

        Ok(())
    }

    /// Highest applied migration version, 0 for a fresh database
    pub async fn schema_version(&self) -> Result<i32> {
        let (version,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let pending_requests = self.count_pending().await?;
        let (retried_requests,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_requests WHERE retry_count > 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(DatabaseStats {
            pending_requests,
            retried_requests: retried_requests as u64,
            schema_version: self.schema_version().await?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of queued requests
    pub pending_requests: u64,
    /// Number of queued requests that have failed at least one replay
    pub retried_requests: u64,
    pub schema_version: i32,
}
