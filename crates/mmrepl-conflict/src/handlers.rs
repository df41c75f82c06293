//! Per-relation conflict handler cache
//!
//! Registrations are loaded lazily from the relation metadata source and
//! kept until the source signals that a relation (or everything) changed.
//! The cache never modifies registrations.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;
use mmrepl_core::{
    domain::RelationName,
    ports::{ConflictHandlerRegistration, IRelationMetadata},
};
use tracing::debug;

use crate::error::ConflictError;

type Registrations = Arc<Vec<ConflictHandlerRegistration>>;

/// Cached entries plus a counter bumped by every invalidation
#[derive(Default)]
struct CacheState {
    entries: DashMap<RelationName, Registrations>,
    generation: AtomicU64,
}

/// Read-mostly cache of conflict handler registrations
pub struct ConflictHandlerCache {
    metadata: Arc<dyn IRelationMetadata>,
    state: Arc<CacheState>,
}

impl ConflictHandlerCache {
    /// Create the cache and subscribe it to `metadata` invalidations
    pub fn new(metadata: Arc<dyn IRelationMetadata>) -> Self {
        let state = Arc::new(CacheState::default());

        let weak = Arc::downgrade(&state);
        metadata.subscribe_invalidations(Arc::new(move |relation: Option<&RelationName>| {
            if let Some(state) = weak.upgrade() {
                evict(&state, relation);
            }
        }));

        Self { metadata, state }
    }

    /// Registrations for `relation`, loading them on first use
    ///
    /// # Errors
    ///
    /// `ConflictError::Storage` if the metadata source fails.
    pub async fn handlers_for(
        &self,
        relation: &RelationName,
    ) -> Result<Registrations, ConflictError> {
        let cached = self.state.entries.get(relation).map(|e| Arc::clone(e.value()));
        if let Some(registrations) = cached {
            return Ok(registrations);
        }

        let generation = self.state.generation.load(Ordering::Acquire);
        let loaded: Registrations = Arc::new(self.metadata.load_conflict_handlers(relation).await?);
        debug!(
            relation = %relation,
            count = loaded.len(),
            "Loaded conflict handlers"
        );

        // The entry guard holds the shard lock, so an eviction racing this
        // check either bumps the generation first or removes the insert.
        let entry = self.state.entries.entry(relation.clone());
        if self.state.generation.load(Ordering::Acquire) == generation {
            entry.insert(Arc::clone(&loaded));
        } else {
            drop(entry);
            debug!(relation = %relation, "Invalidated during load, not caching");
        }
        Ok(loaded)
    }

    /// Drop cached registrations for `relation`, or all of them for `None`
    pub fn invalidate(&self, relation: Option<&RelationName>) {
        evict(&self.state, relation);
    }

    pub fn cached_relations(&self) -> usize {
        self.state.entries.len()
    }
}

fn evict(state: &CacheState, relation: Option<&RelationName>) {
    state.generation.fetch_add(1, Ordering::AcqRel);
    match relation {
        Some(relation) => {
            if state.entries.remove(relation).is_some() {
                debug!(relation = %relation, "Conflict handlers invalidated");
            }
        }
        None => {
            state.entries.clear();
            debug!("All conflict handlers invalidated");
        }
    }
}
