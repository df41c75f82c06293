//! mmrepl Cache - Conflict-history persistence
//!
//! SQLite-based storage for the append-only conflict history written by
//! every apply process.
//!
//! ## Architecture
//!
//! This crate implements the `IConflictHistory` port from `mmrepl-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with schema creation
//! - [`SqliteConflictHistory`] - Autocommit appends and read queries
//! - [`HistoryTransaction`] - Appends that commit or roll back with an apply step
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use mmrepl_cache::{DatabasePool, SqliteConflictHistory};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/mmrepl/conflict_history.db")).await?;
//! let history = SqliteConflictHistory::new(pool.pool().clone());
//! let tx = history.begin().await?;
//! // apply the remote change and log its conflict through `tx`...
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod history;
pub mod pool;

pub use history::{HistoryStats, HistoryTransaction, SqliteConflictHistory};
pub use pool::DatabasePool;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
