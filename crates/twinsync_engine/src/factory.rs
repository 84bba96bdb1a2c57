//! Constructors for sync states.
//!
//! Strategies decide which action applies; the factory only builds the
//! state for it.

use crate::state::SyncState;
use twinsync_core::{RelationRecord, VersionEntry};

/// Builds [`SyncState`] values from their payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateFactory;

impl StateFactory {
    /// Creates the B-entity `source` in A.
    pub fn create_in_a<AI, AV, BI, BV>(source: VersionEntry<BI, BV>) -> SyncState<AI, AV, BI, BV> {
        SyncState::CreateInA { source }
    }

    /// Creates the A-entity `source` in B.
    pub fn create_in_b<AI, AV, BI, BV>(source: VersionEntry<AI, AV>) -> SyncState<AI, AV, BI, BV> {
        SyncState::CreateInB { source }
    }

    /// Overwrites B with A.
    pub fn update_a_to_b<AI, AV, BI, BV>(
        relation: RelationRecord<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::UpdateAToB { relation, a, b }
    }

    /// Overwrites A with B.
    pub fn update_b_to_a<AI, AV, BI, BV>(
        relation: RelationRecord<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::UpdateBToA { relation, a, b }
    }

    /// Deletes the related A-entity.
    pub fn delete_in_a<AI, AV, BI, BV>(
        relation: RelationRecord<AI, AV, BI, BV>,
        target: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::DeleteInA { relation, target }
    }

    /// Deletes the related B-entity.
    pub fn delete_in_b<AI, AV, BI, BV>(
        relation: RelationRecord<AI, AV, BI, BV>,
        target: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::DeleteInB { relation, target }
    }

    /// Deletes an untracked A-entity, once.
    pub fn delete_in_a_with_no_retry<AI, AV, BI, BV>(
        target: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::DeleteInAWithNoRetry { target }
    }

    /// Deletes an untracked B-entity, once.
    pub fn delete_in_b_with_no_retry<AI, AV, BI, BV>(
        target: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::DeleteInBWithNoRetry { target }
    }

    /// Recreates the A side from `source`.
    pub fn restore_in_a<AI, AV, BI, BV>(
        relation: RelationRecord<AI, AV, BI, BV>,
        source: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::RestoreInA { relation, source }
    }

    /// Recreates the B side from `source`.
    pub fn restore_in_b<AI, AV, BI, BV>(
        relation: RelationRecord<AI, AV, BI, BV>,
        source: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::RestoreInB { relation, source }
    }

    /// Drops `relation`, if any.
    pub fn discard<AI, AV, BI, BV>(
        relation: Option<RelationRecord<AI, AV, BI, BV>>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::Discard { relation }
    }

    /// Keeps `relation`, if any.
    pub fn do_nothing<AI, AV, BI, BV>(
        relation: Option<RelationRecord<AI, AV, BI, BV>>,
    ) -> SyncState<AI, AV, BI, BV> {
        SyncState::DoNothing { relation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SyncAction;

    type State = SyncState<String, u64, String, u64>;

    #[test]
    fn constructors_tag_their_action() {
        let rel = RelationRecord::new("a1".to_string(), 1u64, "b1".to_string(), 1u64);
        let a = VersionEntry::new("a1".to_string(), 2u64);
        let b = VersionEntry::new("b1".to_string(), 2u64);

        let built: Vec<State> = vec![
            StateFactory::create_in_a(b.clone()),
            StateFactory::create_in_b(a.clone()),
            StateFactory::update_a_to_b(rel.clone(), a.clone(), b.clone()),
            StateFactory::update_b_to_a(rel.clone(), a.clone(), b.clone()),
            StateFactory::delete_in_a(rel.clone(), a.clone()),
            StateFactory::delete_in_b(rel.clone(), b.clone()),
            StateFactory::delete_in_a_with_no_retry(a.clone()),
            StateFactory::delete_in_b_with_no_retry(b.clone()),
            StateFactory::restore_in_a(rel.clone(), b),
            StateFactory::restore_in_b(rel.clone(), a),
            StateFactory::discard(Some(rel.clone())),
            StateFactory::do_nothing(Some(rel)),
        ];

        let actions: Vec<_> = built.iter().map(SyncState::action).collect();
        assert_eq!(actions, SyncAction::ALL.to_vec());
        assert!(built[10].is_terminal() && built[11].is_terminal());
        assert!(built[..10].iter().all(|s| !s.is_terminal()));
    }
}
