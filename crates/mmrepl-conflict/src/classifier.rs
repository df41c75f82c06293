//! Conflict classification
//!
//! Decides whether a remote change collides with the local row state and,
//! if so, which [`ConflictType`] it is. Classification is a pure function of
//! the change and the stabilised lookup result.
//!
//! | change | local row | result |
//! |---|---|---|
//! | insert | found | `InsertInsert` |
//! | insert | not found | no conflict |
//! | update | found, other origin, diverging tuple | `UpdateUpdate` |
//! | update | found, same origin or same content | no conflict |
//! | update | not found | `UpdateDelete` |
//! | delete | found, other origin | `UpdateDelete` |
//! | delete | found, same origin | no conflict |
//! | delete | not found | `DeleteDelete` |

use mmrepl_core::domain::{
    ChangeKind, ConflictType, Datum, LocalLookupResult, RemoteChange, Tuple,
};
use tracing::trace;

use crate::error::ConflictError;

/// Classify `change` against `local`
///
/// Returns `Ok(None)` when the change can be applied without conflict.
///
/// # Errors
///
/// `ConflictError::InternalConsistency` when the change is missing the
/// tuple its kind requires.
pub fn classify(
    change: &RemoteChange,
    local: &LocalLookupResult,
) -> Result<Option<ConflictType>, ConflictError> {
    let conflict_type = match (change.kind, local) {
        (ChangeKind::Insert, LocalLookupResult::Found(_)) => {
            required_new_tuple(change)?;
            Some(ConflictType::InsertInsert)
        }
        (ChangeKind::Insert, LocalLookupResult::NotFound) => {
            required_new_tuple(change)?;
            None
        }
        (ChangeKind::Update, LocalLookupResult::Found(row)) => {
            let remote = required_new_tuple(change)?;
            if row.origin != change.origin.node && diverges(&row.tuple, remote) {
                Some(ConflictType::UpdateUpdate)
            } else {
                None
            }
        }
        (ChangeKind::Update, LocalLookupResult::NotFound) => {
            required_new_tuple(change)?;
            Some(ConflictType::UpdateDelete)
        }
        (ChangeKind::Delete, LocalLookupResult::Found(row)) => {
            required_old_key(change)?;
            if row.origin != change.origin.node {
                Some(ConflictType::UpdateDelete)
            } else {
                None
            }
        }
        (ChangeKind::Delete, LocalLookupResult::NotFound) => {
            required_old_key(change)?;
            Some(ConflictType::DeleteDelete)
        }
    };

    trace!(
        kind = %change.kind,
        relation = %change.relation,
        found = local.is_found(),
        conflict_type = ?conflict_type,
        "Classified remote change"
    );

    Ok(conflict_type)
}

/// True when some column the remote side actually sent differs locally
///
/// Unchanged out-of-line values carry no information and are ignored.
/// Datum equality treats NaN as equal to NaN.
fn diverges(local: &Tuple, remote: &Tuple) -> bool {
    remote.columns().iter().any(|col| match &col.value {
        Datum::Unchanged => false,
        value => local.get(&col.name) != Some(value),
    })
}

fn required_new_tuple(change: &RemoteChange) -> Result<&Tuple, ConflictError> {
    change.new_tuple.as_ref().ok_or_else(|| {
        ConflictError::InternalConsistency(format!(
            "remote {} on {} carries no new tuple",
            change.kind, change.relation
        ))
    })
}

fn required_old_key(change: &RemoteChange) -> Result<&Tuple, ConflictError> {
    change.old_key_tuple.as_ref().ok_or_else(|| {
        ConflictError::InternalConsistency(format!(
            "remote {} on {} carries no key tuple",
            change.kind, change.relation
        ))
    })
}
