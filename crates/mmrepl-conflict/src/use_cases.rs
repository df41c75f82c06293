//! Apply-path conflict use case
//!
//! Ties lookup, classification, resolution, record building and logging
//! together for one incoming remote change. Everything runs inside the
//! caller's apply transaction: `history` must be bound to it so a rollback
//! also discards the logged conflict.

use std::sync::Arc;

use mmrepl_audit::ConflictLogger;
use mmrepl_core::{
    config::ConflictsConfig,
    domain::{
        ConflictDecision, Disposition, ErrorInfo, LocalLookupResult, RelationName, RemoteChange,
        RemoteOrigin,
    },
    ports::{IConflictHistory, IRelationMetadata, IRowLookup, ITransactionContext},
};
use tracing::{debug, warn};

use crate::{
    builder::{ConflictDetails, ConflictRecordBuilder},
    error::ConflictError,
    handlers::ConflictHandlerCache,
    identity::NodeIdentity,
    lookup::find_by_replica_identity,
    resolver::ConflictResolver,
};

/// What the apply path must do with a remote change
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    /// `None` when the change applied without conflict
    pub decision: Option<ConflictDecision>,
    pub disposition: Disposition,
    /// Row id in the conflict history, when table logging is enabled
    pub history_id: Option<i64>,
    pub local: LocalLookupResult,
}

/// Orchestrates conflict handling for the apply path
pub struct ApplyConflictUseCase {
    lookup: Arc<dyn IRowLookup>,
    identity: NodeIdentity,
    handlers: ConflictHandlerCache,
    resolver: ConflictResolver,
    builder: ConflictRecordBuilder,
    logger: Arc<ConflictLogger>,
}

impl ApplyConflictUseCase {
    pub fn new(
        lookup: Arc<dyn IRowLookup>,
        identity: NodeIdentity,
        handlers: ConflictHandlerCache,
        resolver: ConflictResolver,
        builder: ConflictRecordBuilder,
        logger: Arc<ConflictLogger>,
    ) -> Self {
        Self {
            lookup,
            identity,
            handlers,
            resolver,
            builder,
            logger,
        }
    }

    /// Wire the use case from the `conflicts` configuration section
    pub fn from_config(
        config: &ConflictsConfig,
        lookup: Arc<dyn IRowLookup>,
        identity: NodeIdentity,
        metadata: Arc<dyn IRelationMetadata>,
        logger: Arc<ConflictLogger>,
    ) -> Self {
        Self::new(
            lookup,
            identity.clone(),
            ConflictHandlerCache::new(metadata),
            ConflictResolver::from_config(config),
            ConflictRecordBuilder::new(identity, config.include_tuples),
            logger,
        )
    }

    pub fn handlers(&self) -> &ConflictHandlerCache {
        &self.handlers
    }

    /// Look up the target row of `change`, resolve any conflict and log it
    ///
    /// # Errors
    ///
    /// Any [`ConflictError`]; the caller must abort its transaction and
    /// redeliver the change.
    pub async fn handle_change(
        &self,
        change: &RemoteChange,
        tx: &dyn ITransactionContext,
        history: &dyn IConflictHistory,
    ) -> Result<ApplyOutcome, ConflictError> {
        let key = change.lookup_key().ok_or_else(|| {
            ConflictError::InternalConsistency(format!(
                "remote {} on {} has no replica identity",
                change.kind, change.relation
            ))
        })?;

        let local = find_by_replica_identity(
            self.lookup.as_ref(),
            &self.identity,
            &change.relation,
            &key,
            true,
        )
        .await?;

        let handlers = self.handlers.handlers_for(&change.relation).await?;
        let decision = self
            .resolver
            .classify_and_resolve(change, &local, &handlers)
            .await?;

        let Some(decision) = decision else {
            debug!(kind = %change.kind, relation = %change.relation, "No conflict");
            return Ok(ApplyOutcome {
                decision: None,
                disposition: Disposition::ApplyRemote,
                history_id: None,
                local,
            });
        };

        let record = self
            .builder
            .build(tx, ConflictDetails::for_change(&decision, change, &local))?;
        let history_id = self.logger.log(&record, history).await?;

        Ok(ApplyOutcome {
            disposition: decision.disposition(),
            decision: Some(decision),
            history_id,
            local,
        })
    }

    /// Record a remote transaction whose apply failed with `error`
    ///
    /// `tx` must be a fresh transaction: the one that failed is aborted and
    /// cannot take the record. The returned disposition is always
    /// [`Disposition::Abort`].
    ///
    /// # Errors
    ///
    /// `ConflictError::Precondition` if `tx` is unusable, or
    /// `ConflictError::LogSink` if the record cannot be stored.
    pub async fn handle_apply_error(
        &self,
        remote: RemoteOrigin,
        relation: Option<RelationName>,
        error: ErrorInfo,
        tx: &dyn ITransactionContext,
        history: &dyn IConflictHistory,
    ) -> Result<ApplyOutcome, ConflictError> {
        warn!(
            remote_node = %remote.node,
            remote_txid = %remote.txid,
            error = %error,
            "Remote transaction failed to apply"
        );

        let decision = ConflictResolver::unhandled_abort();
        let record = self
            .builder
            .build(tx, ConflictDetails::for_apply_error(remote, relation, error))?;
        let history_id = self.logger.log(&record, history).await?;

        Ok(ApplyOutcome {
            disposition: decision.disposition(),
            decision: Some(decision),
            history_id,
            local: LocalLookupResult::NotFound,
        })
    }
}
