//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for replication identifiers:
//! node identities, replication-origin handles, transaction ids, log sequence
//! numbers and qualified relation names. Each newtype ensures data validity
//! at construction or parse time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Node identity
// ============================================================================

/// Identity of a database participating in multi-master replication
///
/// A node is the triple of the cluster's system identifier, its WAL
/// timeline and the database oid. Equality is structural.
///
/// The derived ordering compares `system_id`, then `timeline_id`, then
/// `database_id`, ascending. Last-update-wins uses it to break commit
/// timestamp ties, so the field order here must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub system_id: u64,
    pub timeline_id: u32,
    pub database_id: u32,
}

impl NodeId {
    /// Create a new NodeId
    #[must_use]
    pub const fn new(system_id: u64, timeline_id: u32, database_id: u32) -> Self {
        Self {
            system_id,
            timeline_id,
            database_id,
        }
    }

    /// The placeholder identity used when a tuple's origin is unknown
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new(0, 0, 0)
    }

    /// Returns true when this is the unknown placeholder (system id 0)
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.system_id == 0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})",
            self.system_id, self.timeline_id, self.database_id
        )
    }
}

impl FromStr for NodeId {
    type Err = DomainError;

    /// Parses `(sysid,timeline,dboid)`; the parentheses are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);

        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(DomainError::InvalidNodeId(format!(
                "expected (sysid,timeline,dboid), got '{s}'"
            )));
        }

        let system_id = parts[0]
            .parse::<u64>()
            .map_err(|e| DomainError::InvalidNodeId(format!("system id '{}': {e}", parts[0])))?;
        let timeline_id = parts[1]
            .parse::<u32>()
            .map_err(|e| DomainError::InvalidNodeId(format!("timeline '{}': {e}", parts[1])))?;
        let database_id = parts[2]
            .parse::<u32>()
            .map_err(|e| DomainError::InvalidNodeId(format!("database id '{}': {e}", parts[2])))?;

        Ok(Self::new(system_id, timeline_id, database_id))
    }
}

/// Local handle of a replication origin
///
/// Handle `0` is reserved: it marks rows written by local sessions rather
/// than by an apply process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginHandle(u16);

impl OriginHandle {
    /// Handle of locally originated writes
    pub const LOCAL: OriginHandle = OriginHandle(0);

    #[must_use]
    pub const fn new(handle: u16) -> Self {
        Self(handle)
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.0 == 0
    }
}

impl Display for OriginHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Transaction ids and log positions
// ============================================================================

/// A 32-bit transaction id; `0` is invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u32);

impl TransactionId {
    pub const INVALID: TransactionId = TransactionId(0);

    #[must_use]
    pub const fn new(xid: u32) -> Self {
        Self(xid)
    }

    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TransactionId {
    fn from(xid: u32) -> Self {
        Self(xid)
    }
}

/// Log sequence number (write-ahead log position)
///
/// Rendered in the conventional `HI/LO` hexadecimal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lsn(u64);

impl Lsn {
    #[must_use]
    pub const fn new(lsn: u64) -> Self {
        Self(lsn)
    }

    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for Lsn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| DomainError::InvalidLsn(s.to_string()))?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| DomainError::InvalidLsn(s.to_string()))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| DomainError::InvalidLsn(s.to_string()))?;
        Ok(Self((u64::from(hi) << 32) | u64::from(lo)))
    }
}

impl From<u64> for Lsn {
    fn from(lsn: u64) -> Self {
        Self(lsn)
    }
}

// ============================================================================
// Relation identity
// ============================================================================

/// Schema-qualified name of a replicated table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationName {
    schema: String,
    name: String,
}

impl RelationName {
    /// Create a new RelationName
    ///
    /// # Errors
    /// Returns error if either part is empty
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Result<Self, DomainError> {
        let schema = schema.into();
        let name = name.into();
        if schema.is_empty() || name.is_empty() {
            return Err(DomainError::InvalidRelationName(format!(
                "schema and table name must be non-empty: '{schema}.{name}'"
            )));
        }
        Ok(Self { schema, name })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for RelationName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for RelationName {
    type Err = DomainError;

    /// Parses `schema.table`; an unqualified name lands in `public`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new("public", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod node_id_tests {
        use super::*;

        #[test]
        fn test_display() {
            let id = NodeId::new(6_104_873_211_092_837_123, 1, 16384);
            assert_eq!(id.to_string(), "(6104873211092837123,1,16384)");
        }

        #[test]
        fn test_from_str() {
            let id: NodeId = "(5,1,16384)".parse().unwrap();
            assert_eq!(id, NodeId::new(5, 1, 16384));

            let bare: NodeId = "9, 2, 13000".parse().unwrap();
            assert_eq!(bare, NodeId::new(9, 2, 13000));
        }

        #[test]
        fn test_from_str_invalid() {
            assert!("(5,1)".parse::<NodeId>().is_err());
            assert!("(x,1,2)".parse::<NodeId>().is_err());
            assert!("(1,2,-3)".parse::<NodeId>().is_err());
        }

        #[test]
        fn test_ordering_is_sysid_then_timeline_then_database() {
            let a = NodeId::new(5, 9, 9);
            let b = NodeId::new(9, 1, 1);
            assert!(a < b);

            let c = NodeId::new(5, 1, 9);
            let d = NodeId::new(5, 2, 1);
            assert!(c < d);

            let e = NodeId::new(5, 1, 1);
            let f = NodeId::new(5, 1, 2);
            assert!(e < f);
        }

        #[test]
        fn test_unknown() {
            assert!(NodeId::unknown().is_unknown());
            assert!(!NodeId::new(1, 1, 1).is_unknown());
        }
    }

    mod lsn_tests {
        use super::*;

        #[test]
        fn test_display() {
            assert_eq!(Lsn::new(0).to_string(), "0/0");
            assert_eq!(Lsn::new(0x1_0000_00A8).to_string(), "1/A8");
        }

        #[test]
        fn test_from_str() {
            let lsn: Lsn = "16/B374D848".parse().unwrap();
            assert_eq!(lsn.as_u64(), (0x16_u64 << 32) | 0xB374_D848);
        }

        #[test]
        fn test_from_str_invalid() {
            assert!("16B374D848".parse::<Lsn>().is_err());
            assert!("G/0".parse::<Lsn>().is_err());
        }
    }

    mod relation_name_tests {
        use super::*;

        #[test]
        fn test_qualified() {
            let rel: RelationName = "sales.orders".parse().unwrap();
            assert_eq!(rel.schema(), "sales");
            assert_eq!(rel.name(), "orders");
            assert_eq!(rel.to_string(), "sales.orders");
        }

        #[test]
        fn test_unqualified_defaults_to_public() {
            let rel: RelationName = "orders".parse().unwrap();
            assert_eq!(rel.schema(), "public");
        }

        #[test]
        fn test_empty_parts_rejected() {
            assert!(RelationName::new("", "orders").is_err());
            assert!(".orders".parse::<RelationName>().is_err());
        }
    }

    #[test]
    fn test_transaction_id_validity() {
        assert!(!TransactionId::INVALID.is_valid());
        assert!(TransactionId::new(742).is_valid());
    }

    #[test]
    fn test_origin_handle_local() {
        assert!(OriginHandle::LOCAL.is_local());
        assert!(!OriginHandle::new(3).is_local());
    }
}
