//! Identity and version types
//!
//! `ObjectId` is the engine-assigned surrogate key of a persisted entity.
//! `SchemaVersion` is the migration state recorded inside a store file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned surrogate key of a persisted entity row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(i64);

impl ObjectId {
    /// Wrap a raw row identifier
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw row identifier
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ObjectId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Schema version counter persisted in a store's metadata table
///
/// A freshly created store has version zero.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// Version of a store that has never been migrated
    pub const ZERO: SchemaVersion = SchemaVersion(0);

    pub fn new(version: u32) -> Self {
        Self(version)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// The version immediately after this one
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u32> for SchemaVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_ordering() {
        let mut ids = vec![ObjectId::new(3), ObjectId::new(1), ObjectId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ObjectId::new(1), ObjectId::new(2), ObjectId::new(3)]);
    }

    #[test]
    fn test_object_id_serializes_as_integer() {
        let json = serde_json::to_string(&ObjectId::new(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_schema_version_defaults_to_zero() {
        assert_eq!(SchemaVersion::default(), SchemaVersion::ZERO);
        assert_eq!(SchemaVersion::ZERO.next(), SchemaVersion::new(1));
    }

    #[test]
    fn test_schema_version_next_saturates() {
        let max = SchemaVersion::new(u32::MAX);
        assert_eq!(max.next(), max);
    }
}
