//! Row lookup port (driven/secondary port)
//!
//! Locates the local row version matching a replica-identity key. A single
//! scan may observe a row that another local transaction is still writing;
//! in that case it reports the writer instead of a result and the caller
//! waits and scans again.

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{OriginHandle, RelationName, TransactionId},
    Tuple,
};

/// A row version as stored locally, before its origin is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRowVersion {
    pub tuple: Tuple,
    pub xmin: TransactionId,
    /// Replication origin that wrote this version; `LOCAL` for local sessions
    pub origin: OriginHandle,
    pub commit_time: DateTime<Utc>,
}

/// Result of one scan attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// No visible row matches the key
    NotFound,
    /// A stable visible row matches the key
    Found(StoredRowVersion),
    /// The matching row is held by a transaction that has not finished yet
    InProgress(TransactionId),
    /// The row was updated by a concurrent transaction while being locked
    ConcurrentlyUpdated,
}

/// Single-attempt access to local rows by replica identity
#[async_trait::async_trait]
pub trait IRowLookup: Send + Sync {
    /// Scans `relation` once for the row matching `key`
    ///
    /// With `lock` set the matching row is locked against concurrent writers
    /// for the rest of the apply transaction.
    async fn scan(
        &self,
        relation: &RelationName,
        key: &Tuple,
        lock: bool,
    ) -> anyhow::Result<ScanOutcome>;

    /// Blocks until `xid` has committed or aborted
    ///
    /// Bounded by the storage engine's own lock timeout and deadlock
    /// detection.
    async fn wait_for(&self, xid: TransactionId) -> anyhow::Result<()>;
}
