//! Replication origin registry port (driven/secondary port)
//!
//! Every row version written by an apply process is tagged with a small
//! local origin handle. The registry maps those handles back to the node
//! identity they were created for.

use crate::domain::newtypes::{NodeId, OriginHandle};

/// Lookup of replication-origin handles
///
/// Implementations are read-mostly shared state, queried synchronously from
/// the apply path.
pub trait IOriginRegistry: Send + Sync {
    /// Node registered for `handle`, or `None` when the handle is unknown
    ///
    /// Never called with [`OriginHandle::LOCAL`]; that handle always means
    /// the local node.
    fn lookup(&self, handle: OriginHandle) -> Option<NodeId>;

    /// Identity of the node this process runs on
    fn local_node_id(&self) -> NodeId;
}
