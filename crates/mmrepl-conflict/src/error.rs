//! Error types for the conflict engine

use mmrepl_audit::SinkError;
use mmrepl_core::domain::OriginHandle;
use thiserror::Error;

/// Errors that can occur while classifying, resolving or logging a conflict
///
/// None of these are retried here; the apply path aborts its transaction
/// and redelivers the change.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Operation invoked outside its required context
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Replication origin handle has no registered node
    #[error("no node registered for replication origin {0}")]
    Lookup(OriginHandle),

    /// A user conflict handler failed
    #[error("conflict handler '{handler}' failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    /// Writing the conflict to the history table failed
    #[error(transparent)]
    LogSink(#[from] SinkError),

    /// Classification reached a combination that cannot occur
    #[error("internal consistency error: {0}")]
    InternalConsistency(String),

    /// Row lookup or metadata storage error
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
