//! Property-based test generators using proptest.
//!
//! A [`Scenario`] seeds both stores, lets the synchronizer settle them, and
//! then applies random external edits to either side before the next run.

use crate::fixtures::TestRepository;
use proptest::prelude::*;
use twinsync_core::RelationRecord;

/// Strategy for entity contents.
pub fn content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,12}").expect("Invalid regex")
}

/// An external change made to one store between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEdit {
    /// Add an entity to A.
    AddA(String),
    /// Add an entity to B.
    AddB(String),
    /// Append to the n-th entity of A (modulo size).
    EditA(usize, String),
    /// Append to the n-th entity of B (modulo size).
    EditB(usize, String),
    /// Remove the n-th entity of A (modulo size).
    DeleteA(usize),
    /// Remove the n-th entity of B (modulo size).
    DeleteB(usize),
}

impl ExternalEdit {
    /// Applies the edit. Edits on an empty store do nothing.
    pub fn apply(&self, a: &TestRepository, b: &TestRepository) {
        match self {
            ExternalEdit::AddA(content) => {
                a.insert(content.clone());
            }
            ExternalEdit::AddB(content) => {
                b.insert(content.clone());
            }
            ExternalEdit::EditA(n, suffix) => edit_nth(a, *n, suffix),
            ExternalEdit::EditB(n, suffix) => edit_nth(b, *n, suffix),
            ExternalEdit::DeleteA(n) => delete_nth(a, *n),
            ExternalEdit::DeleteB(n) => delete_nth(b, *n),
        }
    }
}

fn nth_id(repo: &TestRepository, n: usize) -> Option<String> {
    let entities = repo.entities();
    if entities.is_empty() {
        return None;
    }
    Some(entities[n % entities.len()].0.clone())
}

fn edit_nth(repo: &TestRepository, n: usize, suffix: &str) {
    if let Some(id) = nth_id(repo, n) {
        repo.modify(&id, |e| e.push_str(suffix));
    }
}

fn delete_nth(repo: &TestRepository, n: usize) {
    if let Some(id) = nth_id(repo, n) {
        repo.remove(&id);
    }
}

/// Strategy for a single external edit.
pub fn external_edit_strategy() -> impl Strategy<Value = ExternalEdit> {
    prop_oneof![
        2 => content_strategy().prop_map(ExternalEdit::AddA),
        2 => content_strategy().prop_map(ExternalEdit::AddB),
        3 => (any::<usize>(), content_strategy()).prop_map(|(n, s)| ExternalEdit::EditA(n, s)),
        3 => (any::<usize>(), content_strategy()).prop_map(|(n, s)| ExternalEdit::EditB(n, s)),
        1 => any::<usize>().prop_map(ExternalEdit::DeleteA),
        1 => any::<usize>().prop_map(ExternalEdit::DeleteB),
    ]
}

/// Initial contents of both stores plus edits applied after a first sync.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Entities seeded into A.
    pub initial_a: Vec<String>,
    /// Entities seeded into B.
    pub initial_b: Vec<String>,
    /// Edits applied after the first run.
    pub edits: Vec<ExternalEdit>,
}

impl Scenario {
    /// Seeds both stores.
    pub fn seed(&self, a: &TestRepository, b: &TestRepository) {
        for content in &self.initial_a {
            a.insert(content.clone());
        }
        for content in &self.initial_b {
            b.insert(content.clone());
        }
    }

    /// Applies every edit in order.
    pub fn apply_edits(&self, a: &TestRepository, b: &TestRepository) {
        for edit in &self.edits {
            edit.apply(a, b);
        }
    }
}

/// Strategy for scenarios of bounded size.
pub fn scenario_strategy(max_entities: usize, max_edits: usize) -> impl Strategy<Value = Scenario> {
    (
        prop::collection::vec(content_strategy(), 0..=max_entities),
        prop::collection::vec(content_strategy(), 0..=max_entities),
        prop::collection::vec(external_edit_strategy(), 0..=max_edits),
    )
        .prop_map(|(initial_a, initial_b, edits)| Scenario {
            initial_a,
            initial_b,
            edits,
        })
}

/// Strategy for relation records with unique ids on both sides.
pub fn relation_records_strategy(
    max: usize,
) -> impl Strategy<Value = Vec<RelationRecord<String, u64, String, u64>>> {
    prop::collection::vec((any::<u64>(), any::<u64>()), 0..=max).prop_map(|versions| {
        versions
            .into_iter()
            .enumerate()
            .map(|(i, (a_version, b_version))| {
                RelationRecord::new(format!("a{i}"), a_version, format!("b{i}"), b_version)
            })
            .collect()
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn records_have_unique_ids(records in relation_records_strategy(20)) {
            let a: std::collections::HashSet<_> = records.iter().map(|r| &r.a_id).collect();
            let b: std::collections::HashSet<_> = records.iter().map(|r| &r.b_id).collect();
            prop_assert_eq!(a.len(), records.len());
            prop_assert_eq!(b.len(), records.len());
        }

        #[test]
        fn scenario_seeds_stores(scenario in scenario_strategy(5, 5)) {
            let a = TestRepository::new("a");
            let b = TestRepository::new("b");
            scenario.seed(&a, &b);
            prop_assert_eq!(a.len(), scenario.initial_a.len());
            prop_assert_eq!(b.len(), scenario.initial_b.len());
            scenario.apply_edits(&a, &b);
        }
    }
}
