//! Sync states: the action chosen for a pair, and its execution.
//!
//! A [`SyncState`] is created by a strategy, executed exactly once, and
//! always ends as one of the two terminal states:
//!
//! - `DoNothing(Some(r))`: `r` is the pair's relation from now on
//! - `Discard(Some(r))`: `r` is dropped from the ledger
//!
//! Terminal states with no relation leave the ledger alone.
//!
//! Execution never fails. Adapter and mapper errors are logged, recorded in
//! the [`ExecutionOutcome`], and turn the pair into its fallback state so it
//! is reconsidered on the next run.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use twinsync_core::{
    AdapterError, AdapterResult, EntityKey, EntityMapper, Ledger, RelationRecord, Repository,
    VersionEntry, VersionToken,
};

/// The action a sync state performs, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyncAction {
    /// Create the B-entity in A.
    CreateInA,
    /// Create the A-entity in B.
    CreateInB,
    /// Overwrite B with A's content.
    UpdateAToB,
    /// Overwrite A with B's content.
    UpdateBToA,
    /// Delete the A-entity.
    DeleteInA,
    /// Delete the B-entity.
    DeleteInB,
    /// Delete an untracked A-entity; failures are not retried.
    DeleteInAWithNoRetry,
    /// Delete an untracked B-entity; failures are not retried.
    DeleteInBWithNoRetry,
    /// Recreate a deleted A-entity from B.
    RestoreInA,
    /// Recreate a deleted B-entity from A.
    RestoreInB,
    /// Drop the relation.
    Discard,
    /// Keep the relation as is.
    DoNothing,
}

impl SyncAction {
    /// Every action, in declaration order.
    pub const ALL: [SyncAction; 12] = [
        SyncAction::CreateInA,
        SyncAction::CreateInB,
        SyncAction::UpdateAToB,
        SyncAction::UpdateBToA,
        SyncAction::DeleteInA,
        SyncAction::DeleteInB,
        SyncAction::DeleteInAWithNoRetry,
        SyncAction::DeleteInBWithNoRetry,
        SyncAction::RestoreInA,
        SyncAction::RestoreInB,
        SyncAction::Discard,
        SyncAction::DoNothing,
    ];

    /// Returns true if the action writes to a repository.
    pub fn writes(&self) -> bool {
        !matches!(self, SyncAction::Discard | SyncAction::DoNothing)
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A pair's action together with everything needed to execute it.
///
/// Entries carry the versions observed during this run's enumeration;
/// relations are the ledger records the pair started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState<AI, AV, BI, BV> {
    /// Create a new A-entity from `source`.
    CreateInA {
        /// The B-entity to copy.
        source: VersionEntry<BI, BV>,
    },
    /// Create a new B-entity from `source`.
    CreateInB {
        /// The A-entity to copy.
        source: VersionEntry<AI, AV>,
    },
    /// Map A's content onto the related B-entity.
    UpdateAToB {
        /// The pair's relation.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Current A entry (source).
        a: VersionEntry<AI, AV>,
        /// Current B entry (destination).
        b: VersionEntry<BI, BV>,
    },
    /// Map B's content onto the related A-entity.
    UpdateBToA {
        /// The pair's relation.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Current A entry (destination).
        a: VersionEntry<AI, AV>,
        /// Current B entry (source).
        b: VersionEntry<BI, BV>,
    },
    /// Delete the related A-entity.
    DeleteInA {
        /// The pair's relation.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Current A entry.
        target: VersionEntry<AI, AV>,
    },
    /// Delete the related B-entity.
    DeleteInB {
        /// The pair's relation.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Current B entry.
        target: VersionEntry<BI, BV>,
    },
    /// Delete an A-entity no relation refers to.
    DeleteInAWithNoRetry {
        /// The A entry.
        target: VersionEntry<AI, AV>,
    },
    /// Delete a B-entity no relation refers to.
    DeleteInBWithNoRetry {
        /// The B entry.
        target: VersionEntry<BI, BV>,
    },
    /// Recreate the A side of a relation from B.
    RestoreInA {
        /// The pair's relation.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Current B entry.
        source: VersionEntry<BI, BV>,
    },
    /// Recreate the B side of a relation from A.
    RestoreInB {
        /// The pair's relation.
        relation: RelationRecord<AI, AV, BI, BV>,
        /// Current A entry.
        source: VersionEntry<AI, AV>,
    },
    /// Terminal: drop the relation, if any.
    Discard {
        /// Relation to remove.
        relation: Option<RelationRecord<AI, AV, BI, BV>>,
    },
    /// Terminal: keep the relation, if any.
    DoNothing {
        /// Relation to keep.
        relation: Option<RelationRecord<AI, AV, BI, BV>>,
    },
}

/// Ids whose content an action needs before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredEntities<'s, AI, BI> {
    /// A-entity to load, if any.
    pub a: Option<&'s AI>,
    /// B-entity to load, if any.
    pub b: Option<&'s BI>,
}

/// A pair that failed to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    /// The action that failed.
    pub action: SyncAction,
    /// Ids involved, for diagnostics.
    pub entity: String,
    /// Error message.
    pub error: String,
    /// Whether the next run may succeed.
    pub retryable: bool,
}

/// Result of executing one sync state.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome<AI, AV, BI, BV> {
    /// The action that was executed.
    pub action: SyncAction,
    /// The terminal state the pair ended in.
    pub next: SyncState<AI, AV, BI, BV>,
    /// Set if the action failed and `next` is its fallback.
    pub failure: Option<PairFailure>,
}

impl<AI, AV, BI, BV> ExecutionOutcome<AI, AV, BI, BV> {
    /// Returns true if the action failed.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Repositories, mapper and preloaded entities for one batch.
pub struct ExecutionContext<'r, A: Repository, B: Repository, M> {
    a: &'r A,
    b: &'r B,
    mapper: &'r M,
    a_entities: HashMap<A::Id, A::Entity>,
    b_entities: HashMap<B::Id, B::Entity>,
}

impl<'r, A, B, M> ExecutionContext<'r, A, B, M>
where
    A: Repository,
    B: Repository,
    M: EntityMapper<A::Entity, B::Entity>,
{
    /// Creates a context with no preloaded entities.
    pub fn new(a: &'r A, b: &'r B, mapper: &'r M) -> Self {
        Self {
            a,
            b,
            mapper,
            a_entities: HashMap::new(),
            b_entities: HashMap::new(),
        }
    }

    /// Creates a context with every entity `states` need loaded in one
    /// fetch per side.
    ///
    /// A failed fetch is logged and leaves that side empty; the affected
    /// actions then fail individually.
    pub fn prepare(
        a: &'r A,
        b: &'r B,
        mapper: &'r M,
        states: &[SyncState<A::Id, A::Version, B::Id, B::Version>],
    ) -> Self {
        let mut a_ids = Vec::new();
        let mut b_ids = Vec::new();
        for state in states {
            let required = state.required_entities();
            a_ids.extend(required.a.cloned());
            b_ids.extend(required.b.cloned());
        }

        let mut context = Self::new(a, b, mapper);
        if !a_ids.is_empty() {
            match a.fetch(&a_ids) {
                Ok(entities) => context.a_entities = entities,
                Err(e) => {
                    tracing::warn!(side = "A", count = a_ids.len(), error = %e, "bulk fetch failed")
                }
            }
        }
        if !b_ids.is_empty() {
            match b.fetch(&b_ids) {
                Ok(entities) => context.b_entities = entities,
                Err(e) => {
                    tracing::warn!(side = "B", count = b_ids.len(), error = %e, "bulk fetch failed")
                }
            }
        }
        context
    }

    /// Number of preloaded entities per side.
    pub fn loaded(&self) -> (usize, usize) {
        (self.a_entities.len(), self.b_entities.len())
    }

    fn a_entity(&self, id: &A::Id) -> AdapterResult<A::Entity> {
        self.a_entities
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::not_found(id))
    }

    fn b_entity(&self, id: &B::Id) -> AdapterResult<B::Entity> {
        self.b_entities
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::not_found(id))
    }
}

impl<AI, AV, BI, BV> SyncState<AI, AV, BI, BV>
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    /// The action this state performs.
    pub fn action(&self) -> SyncAction {
        match self {
            SyncState::CreateInA { .. } => SyncAction::CreateInA,
            SyncState::CreateInB { .. } => SyncAction::CreateInB,
            SyncState::UpdateAToB { .. } => SyncAction::UpdateAToB,
            SyncState::UpdateBToA { .. } => SyncAction::UpdateBToA,
            SyncState::DeleteInA { .. } => SyncAction::DeleteInA,
            SyncState::DeleteInB { .. } => SyncAction::DeleteInB,
            SyncState::DeleteInAWithNoRetry { .. } => SyncAction::DeleteInAWithNoRetry,
            SyncState::DeleteInBWithNoRetry { .. } => SyncAction::DeleteInBWithNoRetry,
            SyncState::RestoreInA { .. } => SyncAction::RestoreInA,
            SyncState::RestoreInB { .. } => SyncAction::RestoreInB,
            SyncState::Discard { .. } => SyncAction::Discard,
            SyncState::DoNothing { .. } => SyncAction::DoNothing,
        }
    }

    /// Returns true for `Discard` and `DoNothing`.
    pub fn is_terminal(&self) -> bool {
        !self.action().writes()
    }

    /// The relation the pair started from, if correlated.
    pub fn relation(&self) -> Option<&RelationRecord<AI, AV, BI, BV>> {
        match self {
            SyncState::UpdateAToB { relation, .. }
            | SyncState::UpdateBToA { relation, .. }
            | SyncState::DeleteInA { relation, .. }
            | SyncState::DeleteInB { relation, .. }
            | SyncState::RestoreInA { relation, .. }
            | SyncState::RestoreInB { relation, .. } => Some(relation),
            SyncState::Discard { relation } | SyncState::DoNothing { relation } => {
                relation.as_ref()
            }
            SyncState::CreateInA { .. }
            | SyncState::CreateInB { .. }
            | SyncState::DeleteInAWithNoRetry { .. }
            | SyncState::DeleteInBWithNoRetry { .. } => None,
        }
    }

    /// Ids whose content must be loaded before execution.
    ///
    /// Creates and restores need their source; updates need their source
    /// and the current destination.
    pub fn required_entities(&self) -> RequiredEntities<'_, AI, BI> {
        let (a, b) = match self {
            SyncState::CreateInB { source } | SyncState::RestoreInB { source, .. } => {
                (Some(&source.id), None)
            }
            SyncState::CreateInA { source } | SyncState::RestoreInA { source, .. } => {
                (None, Some(&source.id))
            }
            SyncState::UpdateAToB { a, b, .. } | SyncState::UpdateBToA { a, b, .. } => {
                (Some(&a.id), Some(&b.id))
            }
            _ => (None, None),
        };
        RequiredEntities { a, b }
    }

    /// Short description of the entities involved.
    pub fn describe(&self) -> String {
        match self {
            SyncState::CreateInB { source } | SyncState::RestoreInB { source, .. } => {
                format!("a={:?}", source.id)
            }
            SyncState::CreateInA { source } | SyncState::RestoreInA { source, .. } => {
                format!("b={:?}", source.id)
            }
            SyncState::UpdateAToB { a, b, .. } | SyncState::UpdateBToA { a, b, .. } => {
                format!("a={:?} b={:?}", a.id, b.id)
            }
            SyncState::DeleteInA { target, .. } | SyncState::DeleteInAWithNoRetry { target } => {
                format!("a={:?}", target.id)
            }
            SyncState::DeleteInB { target, .. } | SyncState::DeleteInBWithNoRetry { target } => {
                format!("b={:?}", target.id)
            }
            SyncState::Discard { relation } | SyncState::DoNothing { relation } => match relation {
                Some(r) => format!("a={:?} b={:?}", r.a_id, r.b_id),
                None => "-".to_string(),
            },
        }
    }

    /// The terminal state this pair takes if its action fails.
    ///
    /// Correlated pairs keep their previous relation and are retried next
    /// run. Uncorrelated no-retry deletes are discarded.
    pub fn fallback(&self) -> Self {
        match self {
            SyncState::CreateInA { .. } | SyncState::CreateInB { .. } => {
                SyncState::DoNothing { relation: None }
            }
            SyncState::DeleteInAWithNoRetry { .. } | SyncState::DeleteInBWithNoRetry { .. } => {
                SyncState::Discard { relation: None }
            }
            SyncState::UpdateAToB { relation, .. }
            | SyncState::UpdateBToA { relation, .. }
            | SyncState::DeleteInA { relation, .. }
            | SyncState::DeleteInB { relation, .. }
            | SyncState::RestoreInA { relation, .. }
            | SyncState::RestoreInB { relation, .. } => SyncState::DoNothing {
                relation: Some(relation.clone()),
            },
            SyncState::Discard { .. } | SyncState::DoNothing { .. } => self.clone(),
        }
    }

    /// Executes the action. Never fails.
    pub fn execute<A, B, M>(
        self,
        ctx: &ExecutionContext<'_, A, B, M>,
    ) -> ExecutionOutcome<AI, AV, BI, BV>
    where
        A: Repository<Id = AI, Version = AV>,
        B: Repository<Id = BI, Version = BV>,
        M: EntityMapper<A::Entity, B::Entity>,
    {
        let action = self.action();
        match self.try_execute(ctx) {
            Ok(next) => ExecutionOutcome {
                action,
                next,
                failure: None,
            },
            Err(error) => {
                let entity = self.describe();
                tracing::warn!(%action, %entity, %error, "sync action failed; pair deferred");
                ExecutionOutcome {
                    action,
                    next: self.fallback(),
                    failure: Some(PairFailure {
                        action,
                        entity,
                        error: error.to_string(),
                        retryable: error.is_retryable(),
                    }),
                }
            }
        }
    }

    /// Executes the action, returning the terminal state on success.
    fn try_execute<A, B, M>(&self, ctx: &ExecutionContext<'_, A, B, M>) -> AdapterResult<Self>
    where
        A: Repository<Id = AI, Version = AV>,
        B: Repository<Id = BI, Version = BV>,
        M: EntityMapper<A::Entity, B::Entity>,
    {
        let mapper = ctx.mapper;
        let next = match self {
            SyncState::CreateInA { source } => {
                let content = ctx.b_entity(&source.id)?;
                let created = ctx.a.create(&|blank| mapper.map_b_to_a(&content, blank))?;
                keep(RelationRecord::new(
                    created.id,
                    created.version,
                    source.id.clone(),
                    source.version.clone(),
                ))
            }
            SyncState::CreateInB { source } => {
                let content = ctx.a_entity(&source.id)?;
                let created = ctx.b.create(&|blank| mapper.map_a_to_b(&content, blank))?;
                keep(RelationRecord::new(
                    source.id.clone(),
                    source.version.clone(),
                    created.id,
                    created.version,
                ))
            }
            SyncState::UpdateAToB { a, b, .. } => {
                let content = ctx.a_entity(&a.id)?;
                let cached = ctx.b_entities.get(&b.id).cloned();
                let written = ctx.b.update(&b.id, &b.version, cached, &|current| {
                    mapper.map_a_to_b(&content, current)
                })?;
                keep(RelationRecord::new(
                    a.id.clone(),
                    a.version.clone(),
                    written.id,
                    written.version,
                ))
            }
            SyncState::UpdateBToA { a, b, .. } => {
                let content = ctx.b_entity(&b.id)?;
                let cached = ctx.a_entities.get(&a.id).cloned();
                let written = ctx.a.update(&a.id, &a.version, cached, &|current| {
                    mapper.map_b_to_a(&content, current)
                })?;
                keep(RelationRecord::new(
                    written.id,
                    written.version,
                    b.id.clone(),
                    b.version.clone(),
                ))
            }
            SyncState::DeleteInA { relation, target } => {
                if !ctx.a.delete(&target.id)? {
                    tracing::debug!(id = ?target.id, "A-entity already gone");
                }
                drop_relation(Some(relation.clone()))
            }
            SyncState::DeleteInB { relation, target } => {
                if !ctx.b.delete(&target.id)? {
                    tracing::debug!(id = ?target.id, "B-entity already gone");
                }
                drop_relation(Some(relation.clone()))
            }
            SyncState::DeleteInAWithNoRetry { target } => {
                ctx.a.delete(&target.id)?;
                drop_relation(None)
            }
            SyncState::DeleteInBWithNoRetry { target } => {
                ctx.b.delete(&target.id)?;
                drop_relation(None)
            }
            SyncState::RestoreInA { source, .. } => {
                let content = ctx.b_entity(&source.id)?;
                let created = ctx.a.create(&|blank| mapper.map_b_to_a(&content, blank))?;
                keep(RelationRecord::new(
                    created.id,
                    created.version,
                    source.id.clone(),
                    source.version.clone(),
                ))
            }
            SyncState::RestoreInB { source, .. } => {
                let content = ctx.a_entity(&source.id)?;
                let created = ctx.b.create(&|blank| mapper.map_a_to_b(&content, blank))?;
                keep(RelationRecord::new(
                    source.id.clone(),
                    source.version.clone(),
                    created.id,
                    created.version,
                ))
            }
            SyncState::Discard { .. } | SyncState::DoNothing { .. } => self.clone(),
        };
        Ok(next)
    }

    /// Applies a terminal state to the ledger.
    ///
    /// Returns false (and leaves the ledger alone) for non-terminal states.
    pub fn apply_to(self, ledger: &mut Ledger<AI, AV, BI, BV>) -> bool {
        match self {
            SyncState::DoNothing { relation } => {
                if let Some(record) = relation {
                    let evicted = ledger.upsert(record);
                    if !evicted.is_empty() {
                        tracing::trace!(count = evicted.len(), "relations replaced");
                    }
                }
                true
            }
            SyncState::Discard { relation } => {
                if let Some(record) = relation {
                    ledger.remove(&record);
                }
                true
            }
            other => {
                tracing::warn!(action = %other.action(), "non-terminal state reached the ledger");
                false
            }
        }
    }
}

fn keep<AI, AV, BI, BV>(relation: RelationRecord<AI, AV, BI, BV>) -> SyncState<AI, AV, BI, BV> {
    SyncState::DoNothing {
        relation: Some(relation),
    }
}

fn drop_relation<AI, AV, BI, BV>(
    relation: Option<RelationRecord<AI, AV, BI, BV>>,
) -> SyncState<AI, AV, BI, BV> {
    SyncState::Discard { relation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinsync_core::{CallCounts, MemoryRepository};

    type State = SyncState<String, u64, String, u64>;
    type Repo = MemoryRepository<String>;

    struct Upper;

    impl EntityMapper<String, String> for Upper {
        fn map_a_to_b(&self, source: &String, _target: String) -> AdapterResult<String> {
            if source.contains("poison") {
                return Err(AdapterError::mapping("poisoned content"));
            }
            Ok(source.to_uppercase())
        }

        fn map_b_to_a(&self, source: &String, _target: String) -> AdapterResult<String> {
            Ok(source.to_lowercase())
        }
    }

    fn run(state: State, a: &Repo, b: &Repo) -> ExecutionOutcome<String, u64, String, u64> {
        let states = [state];
        let ctx = ExecutionContext::prepare(a, b, &Upper, &states);
        let [state] = states;
        state.execute(&ctx)
    }

    fn relation(
        a: &VersionEntry<String, u64>,
        b: &VersionEntry<String, u64>,
    ) -> RelationRecord<String, u64, String, u64> {
        RelationRecord::new(a.id.clone(), a.version, b.id.clone(), b.version)
    }

    #[test]
    fn create_in_b_records_new_relation() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let source = a.insert("hello".into());

        let outcome = run(State::CreateInB { source: source.clone() }, &a, &b);
        assert!(!outcome.is_failure());
        assert_eq!(outcome.action, SyncAction::CreateInB);

        let record = outcome.next.relation().unwrap().clone();
        assert_eq!(record.a_id, source.id);
        assert_eq!(record.a_version, source.version);
        assert_eq!(b.get(&record.b_id).unwrap(), "HELLO");
        assert_eq!(b.version_of(&record.b_id), Some(record.b_version));
    }

    #[test]
    fn update_uses_destination_version() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let a1 = a.insert("new".into());
        let b1 = b.insert("OLD".into());

        let outcome = run(
            State::UpdateAToB {
                relation: relation(&a1, &b1),
                a: a1.clone(),
                b: b1.clone(),
            },
            &a,
            &b,
        );
        assert!(!outcome.is_failure());
        assert_eq!(b.get(&b1.id).unwrap(), "NEW");
        let record = outcome.next.relation().unwrap();
        assert_eq!(Some(record.b_version), b.version_of(&b1.id));
        assert_ne!(record.b_version, b1.version);
    }

    #[test]
    fn stale_destination_falls_back_to_previous_relation() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let a1 = a.insert("new".into());
        let b1 = b.insert("OLD".into());
        let previous = relation(&a1, &b1);
        b.modify(&b1.id, |e| e.push('!'));

        let outcome = run(
            State::UpdateAToB {
                relation: previous.clone(),
                a: a1,
                b: b1.clone(),
            },
            &a,
            &b,
        );
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.action, SyncAction::UpdateAToB);
        assert!(failure.retryable);
        assert_eq!(outcome.next, State::DoNothing { relation: Some(previous) });
        assert_eq!(b.get(&b1.id).unwrap(), "OLD!");
    }

    #[test]
    fn mapper_failure_is_contained() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let source = a.insert("poison pill".into());

        let outcome = run(State::CreateInB { source }, &a, &b);
        assert!(outcome.is_failure());
        assert_eq!(outcome.next, State::DoNothing { relation: None });
        assert!(b.is_empty());
    }

    #[test]
    fn missing_source_fails_with_not_found() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let source = a.insert("x".into());
        a.remove(&source.id);

        let outcome = run(State::CreateInB { source }, &a, &b);
        assert!(outcome.failure.unwrap().error.contains("not found"));
    }

    #[test]
    fn delete_of_missing_entity_succeeds() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let a1 = a.insert("x".into());
        let b1 = b.insert("X".into());
        let rel = relation(&a1, &b1);
        b.remove(&b1.id);

        let outcome = run(
            State::DeleteInB {
                relation: rel.clone(),
                target: b1,
            },
            &a,
            &b,
        );
        assert!(!outcome.is_failure());
        assert_eq!(outcome.next, State::Discard { relation: Some(rel) });
    }

    #[test]
    fn no_retry_delete_discards_on_failure() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let b1 = b.insert("X".into());
        b.fail_writes_for(&b1.id);

        let outcome = run(State::DeleteInBWithNoRetry { target: b1 }, &a, &b);
        assert!(outcome.is_failure());
        assert_eq!(outcome.next, State::Discard { relation: None });
    }

    #[test]
    fn restore_recreates_destination() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let b1 = b.insert("KEPT".into());
        let old = RelationRecord::new("a-gone".to_string(), 1, b1.id.clone(), b1.version);

        let outcome = run(
            State::RestoreInA {
                relation: old,
                source: b1.clone(),
            },
            &a,
            &b,
        );
        let record = outcome.next.relation().unwrap();
        assert_eq!(record.b_id, b1.id);
        assert_ne!(record.a_id, "a-gone");
        assert_eq!(a.get(&record.a_id).unwrap(), "kept");
    }

    #[test]
    fn terminal_states_touch_nothing() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let rel = RelationRecord::new("a1".to_string(), 1, "b1".to_string(), 1);

        let outcome = run(State::Discard { relation: Some(rel) }, &a, &b);
        assert!(!outcome.is_failure());
        assert_eq!(a.counts(), CallCounts::default());
        assert_eq!(b.counts(), CallCounts::default());
    }

    #[test]
    fn prepare_fetches_once_per_side() {
        let (a, b) = (Repo::new("a"), Repo::new("b"));
        let a1 = a.insert("1".into());
        let a2 = a.insert("2".into());
        let states = vec![
            State::CreateInB { source: a1 },
            State::CreateInB { source: a2 },
            State::DoNothing { relation: None },
        ];

        let ctx = ExecutionContext::prepare(&a, &b, &Upper, &states);
        assert_eq!(ctx.loaded(), (2, 0));
        assert_eq!(a.counts().fetches, 1);
        assert_eq!(b.counts().fetches, 0);
    }

    #[test]
    fn apply_terminal_states() {
        let mut ledger = Ledger::new();
        let rel = RelationRecord::new("a1".to_string(), 1u64, "b1".to_string(), 1u64);

        assert!(State::DoNothing { relation: Some(rel.clone()) }.apply_to(&mut ledger));
        assert_eq!(ledger.len(), 1);

        assert!(State::Discard { relation: Some(rel.clone()) }.apply_to(&mut ledger));
        assert!(ledger.is_empty());

        let pending = State::DeleteInAWithNoRetry {
            target: VersionEntry::new("a1".to_string(), 1),
        };
        assert!(!pending.apply_to(&mut ledger));
    }

    #[test]
    fn fallbacks() {
        let rel = RelationRecord::new("a1".to_string(), 1u64, "b1".to_string(), 1u64);
        let entry = VersionEntry::new("a1".to_string(), 2u64);

        let restore = State::RestoreInB {
            relation: rel.clone(),
            source: entry.clone(),
        };
        assert_eq!(restore.fallback(), State::DoNothing { relation: Some(rel) });
        assert_eq!(
            State::CreateInB { source: entry }.fallback(),
            State::DoNothing { relation: None }
        );
    }
}
