//! Conflict resolution
//!
//! Turns a classified conflict into a [`ConflictDecision`]. The procedure,
//! first match wins:
//!
//! 1. A registered conflict handler for the conflict type whose timeframe
//!    covers the gap between the two commit times.
//! 2. The configured default policy. Under last-update-wins the later
//!    commit wins; equal commit times go to the larger [`NodeId`].
//!
//! Every input that influences the decision is passed in explicitly, so two
//! nodes evaluating the same conflict reach the same resolution.

use chrono::{DateTime, Duration, Utc};
use mmrepl_core::{
    config::{ConflictsConfig, DefaultPolicy},
    domain::{
        ConflictDecision, ConflictResolution, ConflictType, LocalLookupResult, LocalRow, NodeId,
        RemoteChange, Tuple,
    },
    ports::{ConflictHandlerRegistration, HandlerVerdict},
};
use tracing::{debug, info};

use crate::{classifier::classify, error::ConflictError};

/// Last-update-wins with a node-identity tie-break
///
/// The later commit wins. On equal commit times the change from the larger
/// node wins, so the mirrored comparison on the other node gives the
/// opposite answer. A node compared against itself keeps the local row.
pub fn last_update_wins(
    local_origin: NodeId,
    local_commit_time: DateTime<Utc>,
    remote_origin: NodeId,
    remote_commit_time: DateTime<Utc>,
) -> ConflictResolution {
    let remote_wins = if remote_commit_time == local_commit_time {
        remote_origin > local_origin
    } else {
        remote_commit_time > local_commit_time
    };

    if remote_wins {
        ConflictResolution::LastUpdateWinsKeepRemote
    } else {
        ConflictResolution::LastUpdateWinsKeepLocal
    }
}

/// Classifies and resolves conflicts for the apply path
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: DefaultPolicy,
}

impl ConflictResolver {
    pub fn new(policy: DefaultPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &ConflictsConfig) -> Self {
        Self::new(config.default_policy)
    }

    pub fn policy(&self) -> DefaultPolicy {
        self.policy
    }

    /// Classify `change` against `local` and resolve any conflict found
    ///
    /// Returns `Ok(None)` when the change applies without conflict.
    /// `handlers` are the registrations of the change's relation.
    ///
    /// # Errors
    ///
    /// `ConflictError::Handler` if a conflict handler fails, and
    /// `ConflictError::InternalConsistency` for malformed changes.
    pub async fn classify_and_resolve(
        &self,
        change: &RemoteChange,
        local: &LocalLookupResult,
        handlers: &[ConflictHandlerRegistration],
    ) -> Result<Option<ConflictDecision>, ConflictError> {
        let Some(conflict_type) = classify(change, local)? else {
            return Ok(None);
        };

        let decision = self.resolve(conflict_type, change, local, handlers).await?;

        debug!(
            relation = %change.relation,
            remote_node = %change.origin.node,
            conflict_type = %decision.conflict_type,
            resolution = %decision.resolution,
            "Conflict resolved"
        );

        Ok(Some(decision))
    }

    /// Resolve an already classified conflict
    ///
    /// # Errors
    ///
    /// See [`ConflictResolver::classify_and_resolve`]. `UnhandledTxAbort`
    /// is rejected; use [`ConflictResolver::unhandled_abort`] for it.
    pub async fn resolve(
        &self,
        conflict_type: ConflictType,
        change: &RemoteChange,
        local: &LocalLookupResult,
        handlers: &[ConflictHandlerRegistration],
    ) -> Result<ConflictDecision, ConflictError> {
        if conflict_type == ConflictType::UnhandledTxAbort {
            return Err(ConflictError::InternalConsistency(
                "apply errors are not resolved against a row".into(),
            ));
        }

        let local_row = local.row();

        if let Some(decision) = run_handler(conflict_type, change, local_row, handlers).await? {
            return Ok(decision);
        }

        let resolution = self.default_resolution(conflict_type, change, local_row)?;
        Ok(ConflictDecision::new(conflict_type, resolution))
    }

    /// Decision for an apply that failed with an uncaught error
    pub fn unhandled_abort() -> ConflictDecision {
        ConflictDecision::new(
            ConflictType::UnhandledTxAbort,
            ConflictResolution::UnhandledTxAbort,
        )
    }

    fn default_resolution(
        &self,
        conflict_type: ConflictType,
        change: &RemoteChange,
        local: Option<&LocalRow>,
    ) -> Result<ConflictResolution, ConflictError> {
        match (conflict_type, local) {
            (
                ConflictType::InsertInsert
                | ConflictType::InsertUpdate
                | ConflictType::UpdateUpdate
                | ConflictType::UpdateDelete,
                Some(row),
            ) => Ok(match self.policy {
                DefaultPolicy::LastUpdateWins => last_update_wins(
                    row.origin,
                    row.commit_time,
                    change.origin.node,
                    change.origin.commit_time,
                ),
                DefaultPolicy::ApplyRemote => ConflictResolution::DefaultApplyChange,
                DefaultPolicy::KeepLocal => ConflictResolution::DefaultSkipChange,
            }),
            (ConflictType::UpdateDelete | ConflictType::DeleteDelete, None) => {
                Ok(ConflictResolution::DefaultSkipChange)
            }
            (conflict_type, local) => Err(ConflictError::InternalConsistency(format!(
                "{} conflict with local row {}",
                conflict_type,
                if local.is_some() { "present" } else { "missing" }
            ))),
        }
    }
}

/// Invoke the first handler registered for `conflict_type` whose
/// timeframe covers the commit-time gap
async fn run_handler(
    conflict_type: ConflictType,
    change: &RemoteChange,
    local: Option<&LocalRow>,
    handlers: &[ConflictHandlerRegistration],
) -> Result<Option<ConflictDecision>, ConflictError> {
    let gap: Option<Duration> = local.map(|row| change.origin.commit_time - row.commit_time);

    let Some(registration) = handlers
        .iter()
        .find(|h| h.conflict_type == conflict_type && h.covers(gap))
    else {
        return Ok(None);
    };

    let local_tuple = local.map(|row| &row.tuple);
    let remote_tuple: Option<&Tuple> = change
        .new_tuple
        .as_ref()
        .or(change.old_key_tuple.as_ref());

    let verdict = registration
        .handler
        .resolve(local_tuple, remote_tuple, conflict_type)
        .await
        .map_err(|source| ConflictError::Handler {
            handler: registration.name.clone(),
            source,
        })?;

    let decision = match verdict {
        HandlerVerdict::ReturnTuple(tuple) => ConflictDecision::new(
            conflict_type,
            ConflictResolution::ConflictTriggerReturnedTuple,
        )
        .with_replacement(tuple),
        HandlerVerdict::Skip => {
            ConflictDecision::new(conflict_type, ConflictResolution::ConflictTriggerSkipChange)
        }
    };

    info!(
        handler = %registration.name,
        relation = %change.relation,
        conflict_type = %conflict_type,
        resolution = %decision.resolution,
        "Conflict handler decided conflict"
    );

    Ok(Some(decision))
}
