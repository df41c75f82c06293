//! Conflict domain entities
//!
//! This module defines the classification and resolution vocabulary of the
//! apply path, the decision the resolver hands back, and the immutable
//! [`ConflictRecord`] written to the conflict-history store and server log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{Lsn, NodeId, RelationName, TransactionId};
use super::tuple::Tuple;

// ============================================================================
// Conflict type
// ============================================================================

/// What kind of collision a remote change ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Remote insert hit an existing row with the same key
    InsertInsert,
    /// Remote insert collided with a row being updated locally
    InsertUpdate,
    /// Remote and local updates touched the same row from different origins
    UpdateUpdate,
    /// One side updated a row the other side deleted
    UpdateDelete,
    /// Both sides deleted the same row
    DeleteDelete,
    /// Applying the remote transaction raised an error
    UnhandledTxAbort,
}

impl ConflictType {
    pub const ALL: [ConflictType; 6] = [
        ConflictType::InsertInsert,
        ConflictType::InsertUpdate,
        ConflictType::UpdateUpdate,
        ConflictType::UpdateDelete,
        ConflictType::DeleteDelete,
        ConflictType::UnhandledTxAbort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::InsertInsert => "insert_insert",
            ConflictType::InsertUpdate => "insert_update",
            ConflictType::UpdateUpdate => "update_update",
            ConflictType::UpdateDelete => "update_delete",
            ConflictType::DeleteDelete => "delete_delete",
            ConflictType::UnhandledTxAbort => "unhandled_tx_abort",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConflictType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownConflictType(s.to_string()))
    }
}

// ============================================================================
// Conflict resolution
// ============================================================================

/// How a conflict was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    ConflictTriggerSkipChange,
    ConflictTriggerReturnedTuple,
    LastUpdateWinsKeepLocal,
    LastUpdateWinsKeepRemote,
    #[serde(rename = "apply_change")]
    DefaultApplyChange,
    #[serde(rename = "skip_change")]
    DefaultSkipChange,
    UnhandledTxAbort,
}

impl ConflictResolution {
    pub const ALL: [ConflictResolution; 7] = [
        ConflictResolution::ConflictTriggerSkipChange,
        ConflictResolution::ConflictTriggerReturnedTuple,
        ConflictResolution::LastUpdateWinsKeepLocal,
        ConflictResolution::LastUpdateWinsKeepRemote,
        ConflictResolution::DefaultApplyChange,
        ConflictResolution::DefaultSkipChange,
        ConflictResolution::UnhandledTxAbort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::ConflictTriggerSkipChange => "conflict_trigger_skip_change",
            ConflictResolution::ConflictTriggerReturnedTuple => "conflict_trigger_returned_tuple",
            ConflictResolution::LastUpdateWinsKeepLocal => "last_update_wins_keep_local",
            ConflictResolution::LastUpdateWinsKeepRemote => "last_update_wins_keep_remote",
            ConflictResolution::DefaultApplyChange => "apply_change",
            ConflictResolution::DefaultSkipChange => "skip_change",
            ConflictResolution::UnhandledTxAbort => "unhandled_tx_abort",
        }
    }

    /// What the apply path must do for this resolution
    pub fn disposition(&self) -> Disposition {
        match self {
            ConflictResolution::ConflictTriggerReturnedTuple => Disposition::ApplyReplacement,
            ConflictResolution::LastUpdateWinsKeepRemote
            | ConflictResolution::DefaultApplyChange => Disposition::ApplyRemote,
            ConflictResolution::LastUpdateWinsKeepLocal => Disposition::KeepLocal,
            ConflictResolution::ConflictTriggerSkipChange
            | ConflictResolution::DefaultSkipChange => Disposition::Skip,
            ConflictResolution::UnhandledTxAbort => Disposition::Abort,
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConflictResolution::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::UnknownResolution(s.to_string()))
    }
}

/// Action the apply path executes once a conflict is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Apply the incoming remote change as received
    ApplyRemote,
    /// Apply the tuple a conflict handler returned instead
    ApplyReplacement,
    /// Leave the local row untouched
    KeepLocal,
    /// Discard the remote change
    Skip,
    /// Abort the apply transaction
    Abort,
}

/// Output of the classifier and resolver for one conflict event
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDecision {
    pub conflict_type: ConflictType,
    pub resolution: ConflictResolution,
    /// Set only for `ConflictTriggerReturnedTuple`
    pub replacement: Option<Tuple>,
}

impl ConflictDecision {
    pub fn new(conflict_type: ConflictType, resolution: ConflictResolution) -> Self {
        Self {
            conflict_type,
            resolution,
            replacement: None,
        }
    }

    pub fn with_replacement(mut self, tuple: Tuple) -> Self {
        self.replacement = Some(tuple);
        self
    }

    pub fn disposition(&self) -> Disposition {
        self.resolution.disposition()
    }
}

// ============================================================================
// Apply error detail
// ============================================================================

/// Error detail captured when a conflict is an apply-time failure
///
/// Mirrors the fields a database error report carries. Only `sqlstate` and
/// `message` are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub sqlstate: String,
    pub message: String,
    pub cursor_pos: Option<i32>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub context: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub datatype: Option<String>,
    pub constraint: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
}

impl ErrorInfo {
    pub fn new(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attributes the error to a relation
    pub fn with_relation(mut self, relation: &RelationName) -> Self {
        self.schema = Some(relation.schema().to_string());
        self.table = Some(relation.name().to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.sqlstate, self.message)
    }
}

// ============================================================================
// Conflict record
// ============================================================================

/// Everything needed to assemble a [`ConflictRecord`]
///
/// Filled in by the record builder; the record itself cannot be changed
/// after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecordParts {
    pub local_node: NodeId,
    pub local_conflict_txid: TransactionId,
    pub local_conflict_lsn: Lsn,
    pub local_conflict_time: DateTime<Utc>,
    pub object_schema: Option<String>,
    pub object_name: Option<String>,
    pub remote_node: NodeId,
    pub remote_txid: TransactionId,
    pub remote_commit_time: DateTime<Utc>,
    pub remote_commit_lsn: Lsn,
    pub conflict_type: ConflictType,
    pub resolution: ConflictResolution,
    pub local_tuple: Option<Tuple>,
    pub remote_tuple: Option<Tuple>,
    pub local_tuple_null: bool,
    pub local_tuple_xmin: Option<TransactionId>,
    pub local_tuple_origin: Option<NodeId>,
    pub local_commit_time: Option<DateTime<Utc>>,
    pub key_text: Option<String>,
    pub apply_error: Option<ErrorInfo>,
}

/// Immutable snapshot of one conflict event
///
/// `local_conflict_*` describe when and where the conflict was detected;
/// `remote_*` and `local_commit_time` describe when each side's write
/// originally committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    local_node: NodeId,
    local_conflict_txid: TransactionId,
    local_conflict_lsn: Lsn,
    local_conflict_time: DateTime<Utc>,
    object_schema: Option<String>,
    object_name: Option<String>,
    remote_node: NodeId,
    remote_txid: TransactionId,
    remote_commit_time: DateTime<Utc>,
    remote_commit_lsn: Lsn,
    conflict_type: ConflictType,
    resolution: ConflictResolution,
    local_tuple: Option<Tuple>,
    remote_tuple: Option<Tuple>,
    local_tuple_null: bool,
    local_tuple_xmin: Option<TransactionId>,
    local_tuple_origin: Option<NodeId>,
    local_commit_time: Option<DateTime<Utc>>,
    key_text: Option<String>,
    apply_error: Option<ErrorInfo>,
}

impl From<ConflictRecordParts> for ConflictRecord {
    fn from(p: ConflictRecordParts) -> Self {
        Self {
            local_node: p.local_node,
            local_conflict_txid: p.local_conflict_txid,
            local_conflict_lsn: p.local_conflict_lsn,
            local_conflict_time: p.local_conflict_time,
            object_schema: p.object_schema,
            object_name: p.object_name,
            remote_node: p.remote_node,
            remote_txid: p.remote_txid,
            remote_commit_time: p.remote_commit_time,
            remote_commit_lsn: p.remote_commit_lsn,
            conflict_type: p.conflict_type,
            resolution: p.resolution,
            local_tuple: p.local_tuple,
            remote_tuple: p.remote_tuple,
            local_tuple_null: p.local_tuple_null,
            local_tuple_xmin: p.local_tuple_xmin,
            local_tuple_origin: p.local_tuple_origin,
            local_commit_time: p.local_commit_time,
            key_text: p.key_text,
            apply_error: p.apply_error,
        }
    }
}

impl ConflictRecord {
    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    pub fn local_conflict_txid(&self) -> TransactionId {
        self.local_conflict_txid
    }

    pub fn local_conflict_lsn(&self) -> Lsn {
        self.local_conflict_lsn
    }

    pub fn local_conflict_time(&self) -> DateTime<Utc> {
        self.local_conflict_time
    }

    pub fn object_schema(&self) -> Option<&str> {
        self.object_schema.as_deref()
    }

    pub fn object_name(&self) -> Option<&str> {
        self.object_name.as_deref()
    }

    /// `schema.name` of the affected object, if known
    pub fn object_display(&self) -> Option<String> {
        match (&self.object_schema, &self.object_name) {
            (Some(s), Some(n)) => Some(format!("{s}.{n}")),
            (None, Some(n)) => Some(n.clone()),
            _ => None,
        }
    }

    pub fn remote_node(&self) -> NodeId {
        self.remote_node
    }

    pub fn remote_txid(&self) -> TransactionId {
        self.remote_txid
    }

    pub fn remote_commit_time(&self) -> DateTime<Utc> {
        self.remote_commit_time
    }

    pub fn remote_commit_lsn(&self) -> Lsn {
        self.remote_commit_lsn
    }

    pub fn conflict_type(&self) -> ConflictType {
        self.conflict_type
    }

    pub fn resolution(&self) -> ConflictResolution {
        self.resolution
    }

    pub fn local_tuple(&self) -> Option<&Tuple> {
        self.local_tuple.as_ref()
    }

    pub fn remote_tuple(&self) -> Option<&Tuple> {
        self.remote_tuple.as_ref()
    }

    /// True when there was no local row to report
    pub fn local_tuple_null(&self) -> bool {
        self.local_tuple_null
    }

    pub fn local_tuple_xmin(&self) -> Option<TransactionId> {
        self.local_tuple_xmin
    }

    /// Last writer of the local row; `None` when unknown
    pub fn local_tuple_origin(&self) -> Option<NodeId> {
        self.local_tuple_origin
    }

    pub fn local_commit_time(&self) -> Option<DateTime<Utc>> {
        self.local_commit_time
    }

    /// Rendering of the affected row's key columns
    pub fn key_text(&self) -> Option<&str> {
        self.key_text.as_deref()
    }

    pub fn apply_error(&self) -> Option<&ErrorInfo> {
        self.apply_error.as_ref()
    }
}
