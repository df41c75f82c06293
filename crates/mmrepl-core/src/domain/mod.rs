//! Domain entities and business logic
//!
//! This module contains the core domain types of the replication conflict
//! engine:
//! - Newtypes for node identities, transaction ids, LSNs and relations
//! - Row images (tuples) and the remote changes that carry them
//! - Conflict classification, resolution and the immutable conflict record
//! - Domain-specific error types

pub mod change;
pub mod conflict;
pub mod errors;
pub mod newtypes;
pub mod tuple;

// Re-export commonly used types
pub use change::{ChangeKind, LocalLookupResult, LocalRow, RemoteChange, RemoteOrigin};
pub use conflict::{
    ConflictDecision, ConflictRecord, ConflictRecordParts, ConflictResolution, ConflictType,
    Disposition, ErrorInfo,
};
pub use errors::DomainError;
pub use newtypes::*;
pub use tuple::{Column, Datum, Tuple};
