//! Conflict record assembly
//!
//! Stamps a resolved conflict with where and when it was detected and
//! freezes it into a [`ConflictRecord`] for the conflict sink.

use mmrepl_core::{
    domain::{
        ConflictDecision, ConflictRecord, ConflictRecordParts, ConflictResolution, ConflictType,
        ErrorInfo, LocalLookupResult, LocalRow, RelationName, RemoteChange, RemoteOrigin, Tuple,
    },
    ports::ITransactionContext,
};

use crate::{error::ConflictError, identity::NodeIdentity};

/// Inputs describing one conflict event
#[derive(Debug, Clone)]
pub struct ConflictDetails {
    pub conflict_type: ConflictType,
    pub resolution: ConflictResolution,
    pub remote: RemoteOrigin,
    pub relation: Option<RelationName>,
    pub local_row: Option<LocalRow>,
    pub remote_tuple: Option<Tuple>,
    pub apply_error: Option<ErrorInfo>,
}

impl ConflictDetails {
    /// Details of a row conflict found while applying `change`
    pub fn for_change(
        decision: &ConflictDecision,
        change: &RemoteChange,
        local: &LocalLookupResult,
    ) -> Self {
        Self {
            conflict_type: decision.conflict_type,
            resolution: decision.resolution,
            remote: change.origin,
            relation: Some(change.relation.clone()),
            local_row: local.row().cloned(),
            remote_tuple: change
                .new_tuple
                .clone()
                .or_else(|| change.old_key_tuple.clone()),
            apply_error: None,
        }
    }

    /// Details of a remote transaction whose apply failed with `error`
    pub fn for_apply_error(
        remote: RemoteOrigin,
        relation: Option<RelationName>,
        error: ErrorInfo,
    ) -> Self {
        Self {
            conflict_type: ConflictType::UnhandledTxAbort,
            resolution: ConflictResolution::UnhandledTxAbort,
            remote,
            relation,
            local_row: None,
            remote_tuple: None,
            apply_error: Some(error),
        }
    }
}

/// Builds [`ConflictRecord`]s inside the apply transaction
#[derive(Clone)]
pub struct ConflictRecordBuilder {
    identity: NodeIdentity,
    include_tuples: bool,
}

impl ConflictRecordBuilder {
    /// `include_tuples` keeps the full row images in the record; without it
    /// only the key rendering, xmin and origin of the local row survive.
    pub fn new(identity: NodeIdentity, include_tuples: bool) -> Self {
        Self {
            identity,
            include_tuples,
        }
    }

    /// Assemble the record for `details`
    ///
    /// # Errors
    ///
    /// `ConflictError::Precondition` when `tx` is not an active, healthy
    /// transaction.
    pub fn build(
        &self,
        tx: &dyn ITransactionContext,
        details: ConflictDetails,
    ) -> Result<ConflictRecord, ConflictError> {
        if !tx.in_transaction() {
            return Err(ConflictError::Precondition(
                "conflict record built outside a transaction".into(),
            ));
        }
        if tx.is_aborted() {
            return Err(ConflictError::Precondition(
                "conflict record built in an aborted transaction".into(),
            ));
        }

        let ConflictDetails {
            conflict_type,
            resolution,
            remote,
            relation,
            local_row,
            remote_tuple,
            apply_error,
        } = details;

        // Apply errors name the object they failed on; prefer that.
        let (object_schema, object_name) = match &apply_error {
            Some(err) if err.table.is_some() => (err.schema.clone(), err.table.clone()),
            _ => (
                relation.as_ref().map(|r| r.schema().to_string()),
                relation.as_ref().map(|r| r.name().to_string()),
            ),
        };

        let key_text = local_row
            .as_ref()
            .map(|row| &row.tuple)
            .or(remote_tuple.as_ref())
            .map(Tuple::render_key);

        let local_tuple_null = local_row.is_none();
        let (local_tuple, local_tuple_xmin, local_tuple_origin, local_commit_time) =
            match local_row {
                Some(row) => (
                    Some(row.tuple),
                    Some(row.xmin),
                    Some(row.origin),
                    Some(row.commit_time),
                ),
                None => (None, None, None, None),
            };

        Ok(ConflictRecord::from(ConflictRecordParts {
            local_node: self.identity.local_node_id(),
            local_conflict_txid: tx.current_txid(),
            local_conflict_lsn: tx.current_lsn(),
            local_conflict_time: tx.now(),
            object_schema,
            object_name,
            remote_node: remote.node,
            remote_txid: remote.txid,
            remote_commit_time: remote.commit_time,
            remote_commit_lsn: remote.commit_lsn,
            conflict_type,
            resolution,
            local_tuple: local_tuple.filter(|_| self.include_tuples),
            remote_tuple: remote_tuple.filter(|_| self.include_tuples),
            local_tuple_null,
            local_tuple_xmin,
            local_tuple_origin,
            local_commit_time,
            key_text,
            apply_error,
        }))
    }
}
