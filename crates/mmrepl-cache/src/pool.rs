//! Database connection pool management
//!
//! Wraps SQLx's SqlitePool for the conflict-history store:
//! - Automatic directory creation for database files
//! - WAL journal mode so the CLI can read while apply processes append
//! - Schema creation on first connection
//! - Read-only opening of an existing store for inspection
//! - In-memory mode for testing

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Pool of SQLite connections for the conflict-history store
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention between apply processes
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the store at `db_path` and ensures its schema
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if the schema cannot be created.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = Self::connect(options, 5, db_path).await?;
        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Conflict history store opened");

        Ok(Self { pool })
    }

    /// Opens an existing store without creating or migrating anything
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the file does not exist or
    /// cannot be opened.
    pub async fn open_read_only(db_path: &Path) -> Result<Self, CacheError> {
        if !db_path.exists() {
            return Err(CacheError::ConnectionFailed(format!(
                "No conflict history database at {}",
                db_path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = Self::connect(options, 1, db_path).await?;
        tracing::debug!(path = %db_path.display(), "Conflict history store opened read-only");

        Ok(Self { pool })
    }

    /// Creates an in-memory store for testing
    ///
    /// Uses a single connection because SQLite in-memory databases are
    /// per-connection. While a [`crate::HistoryTransaction`] is open it holds
    /// that connection.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if the schema cannot be created.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory conflict history store initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
        db_path: &Path,
    ) -> Result<SqlitePool, CacheError> {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })
    }

    /// Creates the conflict-history schema if missing
    async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
        let migration_sql = include_str!("migrations/20260301_conflict_history.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!(
                    "Failed to create conflict history schema: {}",
                    e
                ))
            })?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}
