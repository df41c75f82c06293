//! ConflictLogger - the conflict sink
//!
//! Writes each finished [`ConflictRecord`] to the enabled destinations,
//! synchronously and inside the apply transaction that detected it:
//!
//! - **table**: appended to the conflict-history store. Failure is fatal and
//!   must abort the apply transaction.
//! - **server log**: one `tracing` event on target `mmrepl::conflict`.
//!   Best effort; formatting problems are reported and otherwise ignored.

use std::collections::HashMap;
use std::sync::Arc;

use mmrepl_core::{
    config::ConflictsConfig,
    domain::{ConflictRecord, NodeId},
    ports::IConflictHistory,
};
use tracing::{debug, info, warn};

use crate::{error::SinkError, format::server_log_line, metrics::ConflictMetrics};

/// Which destinations a conflict is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogDestinations {
    pub table: bool,
    pub server_log: bool,
}

impl LogDestinations {
    pub fn all() -> Self {
        Self {
            table: true,
            server_log: true,
        }
    }

    pub fn from_config(config: &ConflictsConfig) -> Self {
        Self {
            table: config.log_to_table,
            server_log: config.log_to_server_log,
        }
    }
}

/// Conflict sink writing to the history table and the server log.
pub struct ConflictLogger {
    destinations: LogDestinations,
    metrics: Option<Arc<ConflictMetrics>>,
    node_names: HashMap<NodeId, String>,
}

impl ConflictLogger {
    pub fn new(destinations: LogDestinations) -> Self {
        Self {
            destinations,
            metrics: None,
            node_names: HashMap::new(),
        }
    }

    /// Count every logged conflict in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<ConflictMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Name `node` in server-log lines.
    pub fn with_node_name(mut self, node: NodeId, name: impl Into<String>) -> Self {
        self.node_names.insert(node, name.into());
        self
    }

    pub fn destinations(&self) -> LogDestinations {
        self.destinations
    }

    /// Log `record` to every enabled destination.
    ///
    /// `history` must be bound to the apply transaction that detected the
    /// conflict, so that a rollback also discards the history row. Returns
    /// the history row id when the table destination is enabled.
    pub async fn log(
        &self,
        record: &ConflictRecord,
        history: &dyn IConflictHistory,
    ) -> Result<Option<i64>, SinkError> {
        let mut row_id = None;

        if self.destinations.table {
            match history.append(record).await {
                Ok(id) => {
                    debug!(
                        id,
                        conflict_type = %record.conflict_type(),
                        "Conflict appended to history"
                    );
                    row_id = Some(id);
                }
                Err(e) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_log_failure("table");
                    }
                    return Err(SinkError::Table(e));
                }
            }
        }

        if self.destinations.server_log {
            self.log_to_server(record);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_conflict(record.conflict_type(), record.resolution());
        }

        Ok(row_id)
    }

    /// Emit the server-log line, swallowing formatting failures.
    fn log_to_server(&self, record: &ConflictRecord) {
        match server_log_line(record, &self.node_names) {
            Ok(line) => info!(
                target: "mmrepl::conflict",
                conflict_type = %record.conflict_type(),
                resolution = %record.resolution(),
                remote_node = %record.remote_node(),
                "{line}"
            ),
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_log_failure("server_log");
                }
                warn!(error = %e, conflict_type = %record.conflict_type(), "Failed to format conflict log line");
            }
        }
    }
}
