//! Conflict-history port (driven/secondary port)
//!
//! The conflict-history store is an append-only log of resolved conflicts,
//! shared by every apply process. Records are never updated or deleted by
//! the conflict core.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - `append` runs inside the caller's apply transaction where the adapter
//!   supports one, so a rollback also discards the history row.

use serde::{Deserialize, Serialize};

use crate::domain::ConflictRecord;

/// A conflict record as persisted, with its sequence id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConflict {
    pub id: i64,
    #[serde(flatten)]
    pub record: ConflictRecord,
}

/// Append-only sink for conflict records
#[async_trait::async_trait]
pub trait IConflictHistory: Send + Sync {
    /// Appends `record` and returns its sequence id
    async fn append(&self, record: &ConflictRecord) -> anyhow::Result<i64>;
}
