//! mmrepl Audit - Conflict sink
//!
//! Provides:
//! - `ConflictLogger`: writes each resolved conflict to the enabled destinations
//! - `LogDestinations`: which of the history table and server log are enabled
//! - `ConflictMetrics`: prometheus counters per conflict type and resolution
//! - Server-log line formatting with primary-key rendering

pub mod error;
pub mod format;
pub mod logger;
pub mod metrics;

pub use error::SinkError;
pub use logger::{ConflictLogger, LogDestinations};
pub use metrics::ConflictMetrics;
