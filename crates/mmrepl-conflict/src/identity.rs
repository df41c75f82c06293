//! Node identity model
//!
//! Maps local replication-origin handles to the [`NodeId`] of the peer that
//! owns them. Handle 0 always means "written locally" and maps to the local
//! node.

use std::sync::Arc;

use dashmap::DashMap;
use mmrepl_core::{
    domain::{NodeId, OriginHandle},
    ports::IOriginRegistry,
};
use tracing::debug;

use crate::error::ConflictError;

/// Resolves origin handles against an [`IOriginRegistry`]
#[derive(Clone)]
pub struct NodeIdentity {
    registry: Arc<dyn IOriginRegistry>,
}

impl NodeIdentity {
    pub fn new(registry: Arc<dyn IOriginRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve an origin handle to the node it belongs to
    ///
    /// # Errors
    ///
    /// `ConflictError::Lookup` when a non-local handle has no mapping.
    pub fn resolve_origin_to_nodeid(&self, handle: OriginHandle) -> Result<NodeId, ConflictError> {
        if handle.is_local() {
            return Ok(self.registry.local_node_id());
        }
        self.registry
            .lookup(handle)
            .ok_or(ConflictError::Lookup(handle))
    }

    pub fn local_node_id(&self) -> NodeId {
        self.registry.local_node_id()
    }

    /// Structural equality, used to spot a node's own writes looping back
    pub fn equals(a: NodeId, b: NodeId) -> bool {
        a == b
    }
}

/// Origin registry kept in process memory
pub struct InMemoryOriginRegistry {
    local: NodeId,
    origins: DashMap<OriginHandle, NodeId>,
}

impl InMemoryOriginRegistry {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            origins: DashMap::new(),
        }
    }

    /// Map `handle` to `node`, replacing any previous mapping
    pub fn register(&self, handle: OriginHandle, node: NodeId) {
        debug!(handle = %handle, node = %node, "Registered replication origin");
        self.origins.insert(handle, node);
    }

    pub fn forget(&self, handle: OriginHandle) -> Option<NodeId> {
        self.origins.remove(&handle).map(|(_, node)| node)
    }
}

impl IOriginRegistry for InMemoryOriginRegistry {
    fn lookup(&self, handle: OriginHandle) -> Option<NodeId> {
        self.origins.get(&handle).map(|entry| *entry.value())
    }

    fn local_node_id(&self) -> NodeId {
        self.local
    }
}
