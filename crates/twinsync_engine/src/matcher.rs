//! Joins both sides' classifications into synchronization pairs.

use crate::classifier::{Classification, ClassifiedSide, SideChange};
use twinsync_core::{EntityKey, Ledger, RelationRecord, VersionEntry, VersionToken};

/// One unit of reconciliation work.
///
/// The variants cover exactly the reachable classification combinations:
/// an uncorrelated id is `Added` on one side and `NotExisting` on the
/// other; a correlated one is `Changed`, `Unchanged` or `Deleted` on each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPair<AI, AV, BI, BV> {
    /// New on side A, no correlation.
    AddedInA(VersionEntry<AI, AV>),
    /// New on side B, no correlation.
    AddedInB(VersionEntry<BI, BV>),
    /// Correlated by a ledger record.
    Known {
        /// The ledger record.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Change on side A.
        a: SideChange<AI, AV>,
        /// Change on side B.
        b: SideChange<BI, BV>,
    },
}

impl<AI, AV, BI, BV> SyncPair<AI, AV, BI, BV> {
    /// The `(A, B)` classification combination of this pair.
    pub fn classifications(&self) -> (Classification, Classification) {
        match self {
            SyncPair::AddedInA(_) => (Classification::Added, Classification::NotExisting),
            SyncPair::AddedInB(_) => (Classification::NotExisting, Classification::Added),
            SyncPair::Known { a, b, .. } => (a.classification(), b.classification()),
        }
    }

    /// The ledger record, for correlated pairs.
    pub fn relation(&self) -> Option<&RelationRecord<AI, AV, BI, BV>> {
        match self {
            SyncPair::Known { relation, .. } => Some(relation),
            _ => None,
        }
    }
}

/// Builds the pairs for a run.
///
/// Every ledger record yields exactly one `Known` pair, in A-id order,
/// followed by the A additions and then the B additions, each in id order.
pub fn match_pairs<AI, AV, BI, BV>(
    ledger: &Ledger<AI, AV, BI, BV>,
    mut a: ClassifiedSide<AI, AV>,
    mut b: ClassifiedSide<BI, BV>,
) -> Vec<SyncPair<AI, AV, BI, BV>>
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    let mut pairs = Vec::with_capacity(ledger.len() + a.added().len() + b.added().len());

    for relation in ledger.iter() {
        pairs.push(SyncPair::Known {
            a: a.take_known(&relation.a_id),
            b: b.take_known(&relation.b_id),
            relation: relation.clone(),
        });
    }

    pairs.extend(a.into_added().into_iter().map(SyncPair::AddedInA));
    pairs.extend(b.into_added().into_iter().map(SyncPair::AddedInB));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    type TestLedger = Ledger<String, u64, String, u64>;

    fn entry(id: &str, version: u64) -> VersionEntry<String, u64> {
        VersionEntry::new(id.to_string(), version)
    }

    fn ledger() -> TestLedger {
        TestLedger::from_records(vec![
            RelationRecord::new("a1".into(), 1, "b1".into(), 1),
            RelationRecord::new("a2".into(), 1, "b2".into(), 1),
        ])
        .unwrap()
    }

    #[test]
    fn every_record_yields_one_pair() {
        let ledger = ledger();
        let a = classify(vec![entry("a1", 2), entry("a2", 1)], ledger.a_versions());
        let b = classify(vec![entry("b1", 1)], ledger.b_versions());

        let pairs = match_pairs(&ledger, a, b);
        assert_eq!(pairs.len(), 2);
        assert_eq!(
            pairs[0].classifications(),
            (Classification::Changed, Classification::Unchanged)
        );
        assert_eq!(
            pairs[1].classifications(),
            (Classification::Unchanged, Classification::Deleted)
        );
        assert_eq!(pairs[1].relation().unwrap().b_id, "b2");
    }

    #[test]
    fn additions_become_uncorrelated_pairs() {
        let ledger = TestLedger::new();
        let a = classify(vec![entry("a9", 1)], ledger.a_versions());
        let b = classify(vec![entry("b7", 1), entry("b3", 1)], ledger.b_versions());

        let pairs = match_pairs(&ledger, a, b);
        assert_eq!(
            pairs,
            vec![
                SyncPair::AddedInA(entry("a9", 1)),
                SyncPair::AddedInB(entry("b3", 1)),
                SyncPair::AddedInB(entry("b7", 1)),
            ]
        );
        assert_eq!(
            pairs[0].classifications(),
            (Classification::Added, Classification::NotExisting)
        );
        assert!(pairs[0].relation().is_none());
    }

    #[test]
    fn both_sides_gone() {
        let ledger = ledger();
        let a = classify(Vec::new(), ledger.a_versions());
        let b = classify(Vec::new(), ledger.b_versions());

        let pairs = match_pairs(&ledger, a, b);
        assert!(pairs
            .iter()
            .all(|p| p.classifications() == (Classification::Deleted, Classification::Deleted)));
    }
}
