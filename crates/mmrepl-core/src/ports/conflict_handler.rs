//! User conflict handler ports
//!
//! A relation may register handlers per conflict type. The resolver invokes
//! them before falling back to its default policy. Registrations live in the
//! relation's cached metadata and are dropped when that metadata is
//! invalidated.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;

use crate::domain::{newtypes::RelationName, ConflictType, Tuple};

/// What a handler decided
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerVerdict {
    /// Apply this tuple instead of either original
    ReturnTuple(Tuple),
    /// Discard the remote change
    Skip,
}

/// A user-supplied conflict resolution capability
#[async_trait::async_trait]
pub trait IConflictHandler: Send + Sync {
    /// Decides a conflict
    ///
    /// Errors are fatal to the current apply transaction.
    async fn resolve(
        &self,
        local: Option<&Tuple>,
        remote: Option<&Tuple>,
        conflict_type: ConflictType,
    ) -> anyhow::Result<HandlerVerdict>;
}

/// A handler registered for one relation and conflict type
#[derive(Clone)]
pub struct ConflictHandlerRegistration {
    pub name: String,
    pub conflict_type: ConflictType,
    /// Largest gap between the local and remote commit times the handler
    /// still covers; `None` means it always applies
    pub timeframe: Option<Duration>,
    pub handler: Arc<dyn IConflictHandler>,
}

impl ConflictHandlerRegistration {
    pub fn new(
        name: impl Into<String>,
        conflict_type: ConflictType,
        handler: Arc<dyn IConflictHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            conflict_type,
            timeframe: None,
            handler,
        }
    }

    pub fn with_timeframe(mut self, timeframe: Duration) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    /// Whether the handler covers a conflict whose commits are `gap` apart
    ///
    /// An unknown gap (no local commit time) is always covered.
    pub fn covers(&self, gap: Option<Duration>) -> bool {
        match (self.timeframe, gap) {
            (Some(limit), Some(gap)) => gap.abs() <= limit,
            _ => true,
        }
    }
}

impl fmt::Debug for ConflictHandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictHandlerRegistration")
            .field("name", &self.name)
            .field("conflict_type", &self.conflict_type)
            .field("timeframe", &self.timeframe)
            .finish_non_exhaustive()
    }
}

/// Callback fired when relation metadata is invalidated
///
/// `None` invalidates every relation.
pub type InvalidationCallback = Arc<dyn Fn(Option<&RelationName>) + Send + Sync>;

/// Per-relation metadata source owned by the surrounding engine
#[async_trait::async_trait]
pub trait IRelationMetadata: Send + Sync {
    /// Conflict handlers registered for `relation`
    async fn load_conflict_handlers(
        &self,
        relation: &RelationName,
    ) -> anyhow::Result<Vec<ConflictHandlerRegistration>>;

    /// Registers a callback to run whenever relation metadata is invalidated
    fn subscribe_invalidations(&self, callback: InvalidationCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SkipAll;

    #[async_trait::async_trait]
    impl IConflictHandler for SkipAll {
        async fn resolve(
            &self,
            _local: Option<&Tuple>,
            _remote: Option<&Tuple>,
            _conflict_type: ConflictType,
        ) -> anyhow::Result<HandlerVerdict> {
            Ok(HandlerVerdict::Skip)
        }
    }

    #[test]
    fn test_covers_without_timeframe() {
        let reg = ConflictHandlerRegistration::new("skip", ConflictType::UpdateUpdate, Arc::new(SkipAll));
        assert!(reg.covers(None));
        assert!(reg.covers(Some(Duration::days(3650))));
    }

    #[test]
    fn test_covers_with_timeframe() {
        let reg = ConflictHandlerRegistration::new("skip", ConflictType::UpdateUpdate, Arc::new(SkipAll))
            .with_timeframe(Duration::seconds(10));
        assert!(reg.covers(Some(Duration::seconds(10))));
        assert!(reg.covers(Some(Duration::seconds(-4))));
        assert!(!reg.covers(Some(Duration::seconds(11))));
        assert!(reg.covers(None));
    }
}
