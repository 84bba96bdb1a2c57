//! Per-side change classification against the relation ledger.

use std::collections::HashMap;
use std::fmt;
use twinsync_core::{EntityKey, VersionEntry, VersionToken};

/// Change state of an id on one side, relative to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    /// Enumerated, but unknown to the ledger.
    Added,
    /// Known to the ledger, enumerated with a different version.
    Changed,
    /// Known to the ledger, enumerated with the same version.
    Unchanged,
    /// Known to the ledger, no longer enumerated.
    Deleted,
    /// Never seen on this side.
    NotExisting,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Classification::Added => "Added",
            Classification::Changed => "Changed",
            Classification::Unchanged => "Unchanged",
            Classification::Deleted => "Deleted",
            Classification::NotExisting => "NotExisting",
        };
        f.write_str(name)
    }
}

/// Classification of a ledger-known id, with its current entry if it
/// still exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideChange<Id, V> {
    /// Enumerated with a new version.
    Changed(VersionEntry<Id, V>),
    /// Enumerated with the ledger's version.
    Unchanged(VersionEntry<Id, V>),
    /// No longer exists.
    Deleted,
}

impl<Id, V> SideChange<Id, V> {
    /// The classification tag.
    pub fn classification(&self) -> Classification {
        match self {
            SideChange::Changed(_) => Classification::Changed,
            SideChange::Unchanged(_) => Classification::Unchanged,
            SideChange::Deleted => Classification::Deleted,
        }
    }

    /// The current entry, unless deleted.
    pub fn entry(&self) -> Option<&VersionEntry<Id, V>> {
        match self {
            SideChange::Changed(entry) | SideChange::Unchanged(entry) => Some(entry),
            SideChange::Deleted => None,
        }
    }
}

/// Classification of every id on one side.
#[derive(Debug, Clone)]
pub struct ClassifiedSide<Id, V> {
    added: Vec<VersionEntry<Id, V>>,
    known: HashMap<Id, SideChange<Id, V>>,
}

impl<Id: EntityKey, V: VersionToken> ClassifiedSide<Id, V> {
    /// Ids unknown to the ledger, in id order.
    pub fn added(&self) -> &[VersionEntry<Id, V>] {
        &self.added
    }

    /// Classification of an id on this side.
    pub fn classification_of(&self, id: &Id) -> Classification {
        if let Some(change) = self.known.get(id) {
            return change.classification();
        }
        if self.added.binary_search_by(|e| e.id.cmp(id)).is_ok() {
            Classification::Added
        } else {
            Classification::NotExisting
        }
    }

    /// Removes and returns the change of a ledger-known id.
    ///
    /// Every ledger id has one; an id the ledger did not know at
    /// classification time reports `Deleted`.
    pub fn take_known(&mut self, id: &Id) -> SideChange<Id, V> {
        self.known.remove(id).unwrap_or(SideChange::Deleted)
    }

    /// Consumes the classification, yielding the added entries.
    pub fn into_added(self) -> Vec<VersionEntry<Id, V>> {
        self.added
    }

    /// Number of classified ids (known plus added).
    pub fn len(&self) -> usize {
        self.added.len() + self.known.len()
    }

    /// Returns true if nothing was classified.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.known.is_empty()
    }
}

/// Classifies one side's enumeration against the ledger's `(id, version)`
/// pairs for that side.
///
/// Pure: no repository access. If an id is enumerated twice, the last
/// entry wins.
pub fn classify<'l, Id, V>(
    enumerated: Vec<VersionEntry<Id, V>>,
    known: impl IntoIterator<Item = (&'l Id, &'l V)>,
) -> ClassifiedSide<Id, V>
where
    Id: EntityKey,
    V: VersionToken,
{
    let baseline: HashMap<&Id, &V> = known.into_iter().collect();

    let mut current: HashMap<Id, VersionEntry<Id, V>> = HashMap::with_capacity(enumerated.len());
    for entry in enumerated {
        if let Some(previous) = current.insert(entry.id.clone(), entry) {
            tracing::debug!(id = ?previous.id, "id enumerated twice; keeping last entry");
        }
    }

    let mut known_changes = HashMap::with_capacity(baseline.len());
    for (id, version) in &baseline {
        let change = match current.remove(*id) {
            Some(entry) if entry.version == **version => SideChange::Unchanged(entry),
            Some(entry) => SideChange::Changed(entry),
            None => SideChange::Deleted,
        };
        known_changes.insert((*id).clone(), change);
    }

    let mut added: Vec<_> = current.into_values().collect();
    added.sort_by(|a, b| a.id.cmp(&b.id));

    ClassifiedSide {
        added,
        known: known_changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, version: u64) -> VersionEntry<String, u64> {
        VersionEntry::new(id.to_string(), version)
    }

    fn ledger(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
        pairs.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn classifies_every_case() {
        let known = ledger(&[("same", 1), ("edited", 1), ("gone", 1)]);
        let enumerated = vec![entry("same", 1), entry("edited", 2), entry("new", 5)];

        let side = classify(enumerated, known.iter().map(|(id, v)| (id, v)));

        assert_eq!(side.classification_of(&"same".into()), Classification::Unchanged);
        assert_eq!(side.classification_of(&"edited".into()), Classification::Changed);
        assert_eq!(side.classification_of(&"gone".into()), Classification::Deleted);
        assert_eq!(side.classification_of(&"new".into()), Classification::Added);
        assert_eq!(side.classification_of(&"never".into()), Classification::NotExisting);
        assert_eq!(side.len(), 4);
    }

    #[test]
    fn changed_carries_current_entry() {
        let known = ledger(&[("edited", 1)]);
        let mut side = classify(vec![entry("edited", 9)], known.iter().map(|(id, v)| (id, v)));

        match side.take_known(&"edited".into()) {
            SideChange::Changed(current) => assert_eq!(current.version, 9),
            other => panic!("expected Changed, got {other:?}"),
        }
        // Taken: a second lookup falls back to Deleted.
        assert_eq!(side.take_known(&"edited".into()), SideChange::Deleted);
    }

    #[test]
    fn added_is_sorted_and_deduplicated() {
        let side = classify(
            vec![entry("c", 1), entry("a", 1), entry("b", 1), entry("a", 2)],
            std::iter::empty(),
        );

        let ids: Vec<_> = side.added().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(side.added()[0].version, 2);
    }

    #[test]
    fn empty_inputs() {
        let side = classify(Vec::<VersionEntry<String, u64>>::new(), std::iter::empty());
        assert!(side.is_empty());
    }

    #[test]
    fn empty_enumeration_deletes_everything_known() {
        let known = ledger(&[("x", 1), ("y", 2)]);
        let side = classify(Vec::new(), known.iter().map(|(id, v)| (id, v)));

        assert_eq!(side.classification_of(&"x".into()), Classification::Deleted);
        assert_eq!(side.classification_of(&"y".into()), Classification::Deleted);
        assert!(side.added().is_empty());
    }
}
