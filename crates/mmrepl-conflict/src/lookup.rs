//! Replica-identity lookup with restart on concurrent writers
//!
//! A scan can run into a row that another local transaction is still
//! writing. The visible version may change once that writer finishes, so
//! after waiting the scan restarts from scratch instead of resuming. There
//! is no attempt limit; each wait is bounded by the storage engine's own
//! lock timeout and deadlock detection.

use mmrepl_core::{
    domain::{LocalLookupResult, LocalRow, RelationName, Tuple},
    ports::{IRowLookup, ScanOutcome},
};
use tracing::debug;

use crate::{error::ConflictError, identity::NodeIdentity};

/// Find the local row matching `key`, waiting out concurrent writers
///
/// The origin handle of a found row is resolved to its [`NodeId`].
///
/// # Errors
///
/// `ConflictError::Storage` if the scan or wait fails, and
/// `ConflictError::Lookup` if the row's origin handle is unknown.
///
/// [`NodeId`]: mmrepl_core::domain::NodeId
pub async fn find_by_replica_identity(
    lookup: &dyn IRowLookup,
    identity: &NodeIdentity,
    relation: &RelationName,
    key: &Tuple,
    lock: bool,
) -> Result<LocalLookupResult, ConflictError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match lookup.scan(relation, key, lock).await? {
            ScanOutcome::NotFound => return Ok(LocalLookupResult::NotFound),
            ScanOutcome::Found(version) => {
                let origin = identity.resolve_origin_to_nodeid(version.origin)?;
                return Ok(LocalLookupResult::Found(LocalRow {
                    tuple: version.tuple,
                    xmin: version.xmin,
                    origin,
                    commit_time: version.commit_time,
                }));
            }
            ScanOutcome::InProgress(xid) => {
                debug!(relation = %relation, xid = %xid, attempt, "waiting for concurrent writer");
                lookup.wait_for(xid).await?;
            }
            ScanOutcome::ConcurrentlyUpdated => {
                debug!(relation = %relation, attempt, "concurrent update, retrying");
            }
        }
    }
}
