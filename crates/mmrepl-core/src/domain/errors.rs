//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and parse errors for identifiers
//! that arrive as text (configuration, CLI arguments, stored rows).

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid node identity text
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// Invalid log sequence number text
    #[error("Invalid LSN: {0}")]
    InvalidLsn(String),

    /// Unknown conflict type name
    #[error("Unknown conflict type: {0}")]
    UnknownConflictType(String),

    /// Unknown conflict resolution name
    #[error("Unknown conflict resolution: {0}")]
    UnknownResolution(String),

    /// Invalid qualified relation name
    #[error("Invalid relation name: {0}")]
    InvalidRelationName(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
