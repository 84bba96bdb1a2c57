//! Sync strategies: which action applies to each classification pair.

use crate::classifier::SideChange;
use crate::config::{ConflictPolicy, OneWayMode, SyncConfig, SyncDirection};
use crate::factory::StateFactory;
use crate::matcher::SyncPair;
use crate::state::SyncState;
use twinsync_core::{EntityKey, RelationRecord, Side, VersionEntry, VersionToken};

type Relation<AI, AV, BI, BV> = RelationRecord<AI, AV, BI, BV>;

/// Maps every reachable classification combination to an action.
///
/// One method per combination; [`decide`](SyncStrategy::decide) dispatches
/// a pair exhaustively. Entries are this run's current entries, relations
/// are the ledger records.
pub trait SyncStrategy<AI, AV, BI, BV>: Send + Sync
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    /// A new on side A, nothing on side B.
    fn added_not_existing(&self, a: VersionEntry<AI, AV>) -> SyncState<AI, AV, BI, BV>;

    /// A new on side B, nothing on side A.
    fn not_existing_added(&self, b: VersionEntry<BI, BV>) -> SyncState<AI, AV, BI, BV>;

    /// Both sides changed.
    fn changed_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// Only side A changed.
    fn changed_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// Only side B changed.
    fn unchanged_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// A changed, B deleted.
    fn changed_deleted(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// A deleted, B changed.
    fn deleted_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// A unchanged, B deleted.
    fn unchanged_deleted(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// A deleted, B unchanged.
    fn deleted_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV>;

    /// Nothing happened on either side.
    fn unchanged_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        _a: VersionEntry<AI, AV>,
        _b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        StateFactory::do_nothing(Some(relation))
    }

    /// Both sides are gone: forget the relation without touching either.
    fn deleted_deleted(&self, relation: Relation<AI, AV, BI, BV>) -> SyncState<AI, AV, BI, BV> {
        StateFactory::discard(Some(relation))
    }

    /// Chooses the state for a pair.
    fn decide(&self, pair: SyncPair<AI, AV, BI, BV>) -> SyncState<AI, AV, BI, BV> {
        use SideChange::{Changed, Deleted, Unchanged};

        match pair {
            SyncPair::AddedInA(a) => self.added_not_existing(a),
            SyncPair::AddedInB(b) => self.not_existing_added(b),
            SyncPair::Known { relation, a, b } => match (a, b) {
                (Changed(a), Changed(b)) => self.changed_changed(relation, a, b),
                (Changed(a), Unchanged(b)) => self.changed_unchanged(relation, a, b),
                (Unchanged(a), Changed(b)) => self.unchanged_changed(relation, a, b),
                (Unchanged(a), Unchanged(b)) => self.unchanged_unchanged(relation, a, b),
                (Changed(a), Deleted) => self.changed_deleted(relation, a),
                (Unchanged(a), Deleted) => self.unchanged_deleted(relation, a),
                (Deleted, Changed(b)) => self.deleted_changed(relation, b),
                (Deleted, Unchanged(b)) => self.deleted_unchanged(relation, b),
                (Deleted, Deleted) => self.deleted_deleted(relation),
            },
        }
    }
}

/// One side is authoritative; the other mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneWayStrategy {
    source: Side,
    mode: OneWayMode,
}

impl OneWayStrategy {
    /// Creates a strategy with `source` as the authoritative side.
    pub fn new(source: Side, mode: OneWayMode) -> Self {
        Self { source, mode }
    }

    /// The authoritative side.
    pub fn source(&self) -> Side {
        self.source
    }

    /// The mirror's handling of its own additions.
    pub fn mode(&self) -> OneWayMode {
        self.mode
    }

    /// Propagates the source's current content to the mirror.
    fn overwrite_mirror<AI, AV, BI, BV>(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        match self.source {
            Side::A => StateFactory::update_a_to_b(relation, a, b),
            Side::B => StateFactory::update_b_to_a(relation, a, b),
        }
    }
}

impl<AI, AV, BI, BV> SyncStrategy<AI, AV, BI, BV> for OneWayStrategy
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    fn added_not_existing(&self, a: VersionEntry<AI, AV>) -> SyncState<AI, AV, BI, BV> {
        match (self.source, self.mode) {
            (Side::A, _) => StateFactory::create_in_b(a),
            (Side::B, OneWayMode::Replicate) => StateFactory::delete_in_a_with_no_retry(a),
            (Side::B, OneWayMode::Merge) => StateFactory::do_nothing(None),
        }
    }

    fn not_existing_added(&self, b: VersionEntry<BI, BV>) -> SyncState<AI, AV, BI, BV> {
        match (self.source, self.mode) {
            (Side::B, _) => StateFactory::create_in_a(b),
            (Side::A, OneWayMode::Replicate) => StateFactory::delete_in_b_with_no_retry(b),
            (Side::A, OneWayMode::Merge) => StateFactory::do_nothing(None),
        }
    }

    fn changed_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        self.overwrite_mirror(relation, a, b)
    }

    fn changed_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        self.overwrite_mirror(relation, a, b)
    }

    fn unchanged_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        self.overwrite_mirror(relation, a, b)
    }

    fn changed_deleted(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        match self.source {
            Side::A => StateFactory::restore_in_b(relation, a),
            Side::B => StateFactory::delete_in_a(relation, a),
        }
    }

    fn deleted_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        match self.source {
            Side::A => StateFactory::delete_in_b(relation, b),
            Side::B => StateFactory::restore_in_a(relation, b),
        }
    }

    fn unchanged_deleted(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        self.changed_deleted(relation, a)
    }

    fn deleted_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        self.deleted_changed(relation, b)
    }
}

/// Changes flow both ways; concurrent changes are settled by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoWayStrategy {
    policy: ConflictPolicy,
}

impl TwoWayStrategy {
    /// Creates a two-way strategy.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// The conflict policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }
}

impl<AI, AV, BI, BV> SyncStrategy<AI, AV, BI, BV> for TwoWayStrategy
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    fn added_not_existing(&self, a: VersionEntry<AI, AV>) -> SyncState<AI, AV, BI, BV> {
        StateFactory::create_in_b(a)
    }

    fn not_existing_added(&self, b: VersionEntry<BI, BV>) -> SyncState<AI, AV, BI, BV> {
        StateFactory::create_in_a(b)
    }

    fn changed_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        match self.policy.winner(a.modified, b.modified) {
            Side::A => StateFactory::update_a_to_b(relation, a, b),
            Side::B => StateFactory::update_b_to_a(relation, a, b),
        }
    }

    fn changed_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        StateFactory::update_a_to_b(relation, a, b)
    }

    fn unchanged_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        StateFactory::update_b_to_a(relation, a, b)
    }

    fn changed_deleted(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        match self.policy.preferred() {
            Some(Side::B) => StateFactory::delete_in_a(relation, a),
            _ => StateFactory::restore_in_b(relation, a),
        }
    }

    fn deleted_changed(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        match self.policy.preferred() {
            Some(Side::A) => StateFactory::delete_in_b(relation, b),
            _ => StateFactory::restore_in_a(relation, b),
        }
    }

    fn unchanged_deleted(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        a: VersionEntry<AI, AV>,
    ) -> SyncState<AI, AV, BI, BV> {
        StateFactory::delete_in_a(relation, a)
    }

    fn deleted_unchanged(
        &self,
        relation: Relation<AI, AV, BI, BV>,
        b: VersionEntry<BI, BV>,
    ) -> SyncState<AI, AV, BI, BV> {
        StateFactory::delete_in_b(relation, b)
    }
}

/// Builds the strategy a configuration asks for.
pub fn strategy_for<AI, AV, BI, BV>(config: &SyncConfig) -> Box<dyn SyncStrategy<AI, AV, BI, BV>>
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    match config.direction {
        SyncDirection::OneWayToB(mode) => Box::new(OneWayStrategy::new(Side::A, mode)),
        SyncDirection::OneWayToA(mode) => Box::new(OneWayStrategy::new(Side::B, mode)),
        SyncDirection::TwoWay => Box::new(TwoWayStrategy::new(config.conflict_policy)),
    }
}
