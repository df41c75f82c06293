//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the conflict core
//! depends on, but whose implementations live in adapter crates or in the
//! surrounding database engine.
//!
//! ## Ports Overview
//!
//! - [`IOriginRegistry`] - Replication-origin handle to node identity mapping
//! - [`ITransactionContext`] - Read-only view of the enclosing apply transaction
//! - [`IRowLookup`] - Replica-identity row lookup in local storage
//! - [`IConflictHandler`] / [`IRelationMetadata`] - User conflict handlers
//!   and the per-relation metadata that registers them
//! - [`IConflictHistory`] - Append-only conflict-history store

pub mod conflict_handler;
pub mod conflict_history;
pub mod origin_registry;
pub mod row_lookup;
pub mod transaction;

pub use conflict_handler::{
    ConflictHandlerRegistration, HandlerVerdict, IConflictHandler, IRelationMetadata,
    InvalidationCallback,
};
pub use conflict_history::{IConflictHistory, StoredConflict};
pub use origin_registry::IOriginRegistry;
pub use row_lookup::{IRowLookup, ScanOutcome, StoredRowVersion};
pub use transaction::ITransactionContext;
