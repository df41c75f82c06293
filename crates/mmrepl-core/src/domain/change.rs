//! Incoming remote changes and local lookup outcomes
//!
//! These are the two inputs of conflict classification: what a peer asks us
//! to apply, and what the replica-identity lookup found locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Lsn, NodeId, RelationName, TransactionId};
use super::tuple::Tuple;

/// Kind of row operation carried by a remote change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Upper-case command tag, as used in log lines
    pub fn command_tag(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command_tag())
    }
}

/// Where and when a remote transaction originally committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrigin {
    pub node: NodeId,
    pub txid: TransactionId,
    pub commit_time: DateTime<Utc>,
    pub commit_lsn: Lsn,
}

/// A row change received from a peer, to be applied locally
///
/// `new_tuple` is present for inserts and updates; `old_key_tuple` carries
/// the replica identity for updates and deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub kind: ChangeKind,
    pub relation: RelationName,
    pub origin: RemoteOrigin,
    pub new_tuple: Option<Tuple>,
    pub old_key_tuple: Option<Tuple>,
}

impl RemoteChange {
    pub fn insert(relation: RelationName, origin: RemoteOrigin, new_tuple: Tuple) -> Self {
        Self {
            kind: ChangeKind::Insert,
            relation,
            origin,
            new_tuple: Some(new_tuple),
            old_key_tuple: None,
        }
    }

    pub fn update(
        relation: RelationName,
        origin: RemoteOrigin,
        old_key_tuple: Option<Tuple>,
        new_tuple: Tuple,
    ) -> Self {
        Self {
            kind: ChangeKind::Update,
            relation,
            origin,
            new_tuple: Some(new_tuple),
            old_key_tuple,
        }
    }

    pub fn delete(relation: RelationName, origin: RemoteOrigin, old_key_tuple: Tuple) -> Self {
        Self {
            kind: ChangeKind::Delete,
            relation,
            origin,
            new_tuple: None,
            old_key_tuple: Some(old_key_tuple),
        }
    }

    /// The replica-identity key used to locate the local row
    ///
    /// Updates without an explicit old key did not change the key, so the
    /// new tuple's key columns identify the row.
    pub fn lookup_key(&self) -> Option<Tuple> {
        match self.kind {
            ChangeKind::Insert => self.new_tuple.as_ref().map(Tuple::key),
            ChangeKind::Update => self
                .old_key_tuple
                .clone()
                .or_else(|| self.new_tuple.as_ref().map(Tuple::key)),
            ChangeKind::Delete => self.old_key_tuple.clone(),
        }
    }
}

/// The locally visible version of a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRow {
    pub tuple: Tuple,
    /// Transaction that created this row version
    pub xmin: TransactionId,
    /// Node whose write produced this row version
    pub origin: NodeId,
    /// Commit time of the write that produced this row version
    pub commit_time: DateTime<Utc>,
}

/// Outcome of a replica-identity lookup once it has stabilised
#[derive(Debug, Clone, PartialEq)]
pub enum LocalLookupResult {
    NotFound,
    Found(LocalRow),
}

impl LocalLookupResult {
    pub fn row(&self) -> Option<&LocalRow> {
        match self {
            LocalLookupResult::Found(row) => Some(row),
            LocalLookupResult::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, LocalLookupResult::Found(_))
    }
}
