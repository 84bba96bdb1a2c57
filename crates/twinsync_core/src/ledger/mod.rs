//! The relation ledger: the engine's memory of what was synced last time.
//!
//! The [`Ledger`] is an in-memory index of [`RelationRecord`]s keyed by both
//! sides' ids. It enforces that every A-id and every B-id appears in at most
//! one record. Persistence lives behind [`LedgerStore`].

mod format;
mod store;

#[cfg(feature = "std")]
mod file;

pub use format::{
    decode_ledger, encode_ledger, RawLedger, RawRecord, LEDGER_FORMAT_VERSION, LEDGER_MAGIC,
};
pub use store::{validate_profile, LedgerStore, MemoryLedgerStore};

#[cfg(feature = "std")]
pub use file::{list_profiles, FileLedgerStore};

use crate::relation::RelationRecord;
use crate::types::{EntityKey, VersionToken};
use std::collections::BTreeMap;

/// In-memory relation ledger.
#[derive(Debug, Clone)]
pub struct Ledger<AI, AV, BI, BV> {
    by_a: BTreeMap<AI, RelationRecord<AI, AV, BI, BV>>,
    b_to_a: BTreeMap<BI, AI>,
}

impl<AI, AV, BI, BV> Default for Ledger<AI, AV, BI, BV> {
    fn default() -> Self {
        Self {
            by_a: BTreeMap::new(),
            b_to_a: BTreeMap::new(),
        }
    }
}

impl<AI, AV, BI, BV> Ledger<AI, AV, BI, BV>
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from records, rejecting duplicate ids on either side.
    ///
    /// Returns the first offending record on failure.
    pub fn from_records(
        records: impl IntoIterator<Item = RelationRecord<AI, AV, BI, BV>>,
    ) -> Result<Self, RelationRecord<AI, AV, BI, BV>> {
        let mut ledger = Self::new();
        for record in records {
            if ledger.by_a.contains_key(&record.a_id) || ledger.b_to_a.contains_key(&record.b_id) {
                return Err(record);
            }
            ledger.insert_unchecked(record);
        }
        Ok(ledger)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_a.len()
    }

    /// Returns true if the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_a.is_empty()
    }

    /// Looks up the record correlated with an A-id.
    #[must_use]
    pub fn get_by_a(&self, a_id: &AI) -> Option<&RelationRecord<AI, AV, BI, BV>> {
        self.by_a.get(a_id)
    }

    /// Looks up the record correlated with a B-id.
    #[must_use]
    pub fn get_by_b(&self, b_id: &BI) -> Option<&RelationRecord<AI, AV, BI, BV>> {
        self.b_to_a.get(b_id).and_then(|a_id| self.by_a.get(a_id))
    }

    /// Iterates records in A-id order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationRecord<AI, AV, BI, BV>> {
        self.by_a.values()
    }

    /// Iterates `(a_id, a_version)` pairs.
    pub fn a_versions(&self) -> impl Iterator<Item = (&AI, &AV)> {
        self.by_a.values().map(|r| (&r.a_id, &r.a_version))
    }

    /// Iterates `(b_id, b_version)` pairs.
    pub fn b_versions(&self) -> impl Iterator<Item = (&BI, &BV)> {
        self.by_a.values().map(|r| (&r.b_id, &r.b_version))
    }

    /// Inserts or replaces a record.
    ///
    /// Any existing record sharing the A-id or the B-id is evicted first, so
    /// the one-record-per-id invariant holds on both sides. Returns the
    /// evicted records.
    pub fn upsert(
        &mut self,
        record: RelationRecord<AI, AV, BI, BV>,
    ) -> Vec<RelationRecord<AI, AV, BI, BV>> {
        let mut evicted = Vec::new();
        if let Some(old) = self.remove_by_a(&record.a_id) {
            evicted.push(old);
        }
        if let Some(old) = self.remove_by_b(&record.b_id) {
            evicted.push(old);
        }
        self.insert_unchecked(record);
        evicted
    }

    /// Upserts many records. Returns the total number of evicted records.
    pub fn upsert_all(
        &mut self,
        records: impl IntoIterator<Item = RelationRecord<AI, AV, BI, BV>>,
    ) -> usize {
        records
            .into_iter()
            .map(|record| self.upsert(record).len())
            .sum()
    }

    /// Removes the record correlated with an A-id.
    pub fn remove_by_a(&mut self, a_id: &AI) -> Option<RelationRecord<AI, AV, BI, BV>> {
        let record = self.by_a.remove(a_id)?;
        self.b_to_a.remove(&record.b_id);
        Some(record)
    }

    /// Removes the record correlated with a B-id.
    pub fn remove_by_b(&mut self, b_id: &BI) -> Option<RelationRecord<AI, AV, BI, BV>> {
        let a_id = self.b_to_a.remove(b_id)?;
        self.by_a.remove(&a_id)
    }

    /// Removes exactly this correlation, if present.
    ///
    /// A record that shares only one of the ids is left alone.
    pub fn remove(&mut self, record: &RelationRecord<AI, AV, BI, BV>) -> bool {
        match self.by_a.get(&record.a_id) {
            Some(existing) if existing.b_id == record.b_id => {
                self.remove_by_a(&record.a_id);
                true
            }
            _ => false,
        }
    }

    /// Removes many correlations. Returns how many were present.
    pub fn remove_all<'r>(
        &mut self,
        records: impl IntoIterator<Item = &'r RelationRecord<AI, AV, BI, BV>>,
    ) -> usize
    where
        AI: 'r,
        AV: 'r,
        BI: 'r,
        BV: 'r,
    {
        records
            .into_iter()
            .filter(|record| self.remove(record))
            .count()
    }

    /// Consumes the ledger, yielding records in A-id order.
    pub fn into_records(self) -> Vec<RelationRecord<AI, AV, BI, BV>> {
        self.by_a.into_values().collect()
    }

    fn insert_unchecked(&mut self, record: RelationRecord<AI, AV, BI, BV>) {
        self.b_to_a.insert(record.b_id.clone(), record.a_id.clone());
        self.by_a.insert(record.a_id.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestLedger = Ledger<String, u64, String, u64>;

    fn rec(a: &str, av: u64, b: &str, bv: u64) -> RelationRecord<String, u64, String, u64> {
        RelationRecord::new(a.to_string(), av, b.to_string(), bv)
    }

    #[test]
    fn lookup_by_either_side() {
        let mut ledger = TestLedger::new();
        ledger.upsert(rec("a1", 1, "b1", 10));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get_by_a(&"a1".into()).unwrap().b_id, "b1");
        assert_eq!(ledger.get_by_b(&"b1".into()).unwrap().a_id, "a1");
        assert!(ledger.get_by_b(&"b2".into()).is_none());
    }

    #[test]
    fn upsert_replaces_version() {
        let mut ledger = TestLedger::new();
        ledger.upsert(rec("a1", 1, "b1", 10));
        let evicted = ledger.upsert(rec("a1", 2, "b1", 11));

        assert_eq!(evicted, vec![rec("a1", 1, "b1", 10)]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get_by_a(&"a1".into()).unwrap().a_version, 2);
    }

    #[test]
    fn upsert_evicts_records_sharing_either_id() {
        let mut ledger = TestLedger::new();
        ledger.upsert(rec("a1", 1, "b1", 10));
        ledger.upsert(rec("a2", 1, "b2", 10));

        // a1 now correlates with b2: both old records must go.
        let evicted = ledger.upsert(rec("a1", 3, "b2", 12));
        assert_eq!(evicted.len(), 2);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get_by_b(&"b1".into()).is_none());
        assert!(ledger.get_by_a(&"a2".into()).is_none());
    }

    #[test]
    fn remove_requires_exact_correlation() {
        let mut ledger = TestLedger::new();
        ledger.upsert(rec("a1", 1, "b1", 10));

        assert!(!ledger.remove(&rec("a1", 1, "b9", 10)));
        assert_eq!(ledger.len(), 1);

        assert!(ledger.remove(&rec("a1", 5, "b1", 50)));
        assert!(ledger.is_empty());
        assert!(ledger.get_by_b(&"b1".into()).is_none());
    }

    #[test]
    fn bulk_operations() {
        let mut ledger = TestLedger::new();
        let evicted = ledger.upsert_all(vec![
            rec("a1", 1, "b1", 1),
            rec("a2", 1, "b2", 1),
            rec("a3", 1, "b3", 1),
        ]);
        assert_eq!(evicted, 0);
        assert_eq!(ledger.len(), 3);

        let gone = vec![rec("a1", 1, "b1", 1), rec("a3", 1, "b3", 1)];
        assert_eq!(ledger.remove_all(&gone), 2);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get_by_b(&"b3".into()).is_none());
    }

    #[test]
    fn from_records_rejects_duplicates() {
        let ok = TestLedger::from_records(vec![rec("a1", 1, "b1", 1), rec("a2", 1, "b2", 1)]);
        assert_eq!(ok.unwrap().len(), 2);

        let dup_a = TestLedger::from_records(vec![rec("a1", 1, "b1", 1), rec("a1", 1, "b2", 1)]);
        assert_eq!(dup_a.unwrap_err(), rec("a1", 1, "b2", 1));

        let dup_b = TestLedger::from_records(vec![rec("a1", 1, "b1", 1), rec("a2", 1, "b1", 1)]);
        assert!(dup_b.is_err());
    }

    #[test]
    fn iteration_is_ordered_by_a_id() {
        let mut ledger = TestLedger::new();
        ledger.upsert(rec("a3", 1, "b1", 1));
        ledger.upsert(rec("a1", 1, "b3", 1));
        ledger.upsert(rec("a2", 1, "b2", 1));

        let ids: Vec<_> = ledger.iter().map(|r| r.a_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
    }

    mod upsert_props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            // Small id spaces force records to collide on one side or both.
            #[test]
            fn one_record_per_id(ops in prop::collection::vec((0u8..6, 0u8..6, 0u64..4), 1..40)) {
                let mut ledger = TestLedger::new();
                let mut total = 0;
                for (a, b, version) in ops {
                    let (a_id, b_id) = (format!("a{a}"), format!("b{b}"));
                    let evicted = ledger.upsert(rec(&a_id, version, &b_id, version));
                    prop_assert!(evicted.len() <= 2);
                    total = total + 1 - evicted.len();
                    prop_assert_eq!(ledger.len(), total);

                    let latest = ledger.get_by_a(&a_id).map(|r| r.b_id.clone());
                    prop_assert_eq!(latest, Some(b_id));
                }

                let a_ids: HashSet<_> = ledger.iter().map(|r| r.a_id.clone()).collect();
                let b_ids: HashSet<_> = ledger.iter().map(|r| r.b_id.clone()).collect();
                prop_assert_eq!(a_ids.len(), ledger.len());
                prop_assert_eq!(b_ids.len(), ledger.len());
                for record in ledger.iter() {
                    prop_assert_eq!(ledger.get_by_a(&record.a_id), Some(record));
                    prop_assert_eq!(ledger.get_by_b(&record.b_id), Some(record));
                }
            }
        }
    }
}
