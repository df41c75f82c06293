//! mmrepl Conflict - Conflict classification and resolution
//!
//! Provides:
//! - Node identity resolution for replication origins
//! - Classification of remote changes against local row state
//! - Resolution through user conflict handlers, then last-update-wins
//! - Immutable conflict records for the conflict sink
//! - Replica-identity lookup that waits out concurrent local writers
//! - The apply-path use case tying these together

pub mod builder;
pub mod classifier;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod lookup;
pub mod resolver;
pub mod use_cases;

pub use builder::{ConflictDetails, ConflictRecordBuilder};
pub use classifier::classify;
pub use error::ConflictError;
pub use handlers::ConflictHandlerCache;
pub use identity::{InMemoryOriginRegistry, NodeIdentity};
pub use lookup::find_by_replica_identity;
pub use resolver::{last_update_wins, ConflictResolver};
pub use use_cases::{ApplyConflictUseCase, ApplyOutcome};
