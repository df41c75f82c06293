//! Error types for the conflict sink

use thiserror::Error;

/// Errors raised while logging a conflict
///
/// Only the history-table destination can fail; server-log problems are
/// downgraded to warnings.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Appending to the conflict-history store failed
    #[error("failed to append conflict to history: {0}")]
    Table(#[source] anyhow::Error),
}
