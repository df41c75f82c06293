//! mmrepl Core - Domain model and ports for multi-master conflict handling
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `NodeId`, `Tuple`, `RemoteChange`, `LocalLookupResult`,
//!   `ConflictType`, `ConflictResolution`, `ConflictRecord`
//! - **Port definitions** - Traits for collaborators the conflict core depends on:
//!   `IOriginRegistry`, `ITransactionContext`, `IRowLookup`, `IConflictHistory`,
//!   `IConflictHandler`, `IRelationMetadata`
//! - **Configuration** - YAML-backed settings for the local node and conflict logging
//!
//! # Architecture
//!
//! The domain module contains pure data types with no storage or transport
//! dependencies. Ports define trait interfaces that adapter crates (or the
//! embedding replication engine) implement.

pub mod config;
pub mod domain;
pub mod ports;
