//! Correlation records between an A-entity and a B-entity.

use crate::types::VersionEntry;
use serde::{Deserialize, Serialize};

/// The last-known correlation between one A-entity and one B-entity.
///
/// A record is only created once both sides hold a committed entity, and
/// its versions are the baselines change detection compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord<AI, AV, BI, BV> {
    /// Identifier on side A.
    pub a_id: AI,
    /// Committed version on side A.
    pub a_version: AV,
    /// Identifier on side B.
    pub b_id: BI,
    /// Committed version on side B.
    pub b_version: BV,
}

impl<AI, AV, BI, BV> RelationRecord<AI, AV, BI, BV> {
    /// Creates a new record.
    pub fn new(a_id: AI, a_version: AV, b_id: BI, b_version: BV) -> Self {
        Self {
            a_id,
            a_version,
            b_id,
            b_version,
        }
    }

    /// Builds a record from the post-write entries of both sides.
    pub fn from_entries(a: VersionEntry<AI, AV>, b: VersionEntry<BI, BV>) -> Self {
        Self::new(a.id, a.version, b.id, b.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_entries_drops_modification_time() {
        let a = VersionEntry::new("a1".to_string(), 1u64);
        let b = VersionEntry::new(7u32, "etag-1".to_string());

        let record = RelationRecord::from_entries(a, b);
        assert_eq!(record, RelationRecord::new("a1".to_string(), 1, 7, "etag-1".to_string()));
    }
}
