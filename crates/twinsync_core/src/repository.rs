//! Collaborator contracts: repository adapters and entity mappers.
//!
//! The engine never looks inside an entity. A [`Repository`] enumerates
//! `(id, version)` pairs and performs CRUD on one side; an [`EntityMapper`]
//! translates content between the two sides' representations.

use crate::error::AdapterResult;
use crate::types::{EntityKey, TimeWindow, VersionEntry, VersionToken};
use std::collections::HashMap;

/// Transformation applied to a blank (create) or current (update) entity.
pub type EntityTransform<'a, E> = dyn Fn(E) -> AdapterResult<E> + Sync + 'a;

/// Access to one side's entity store.
///
/// # Invariants
///
/// - `create` and `update` return the authoritative post-write version,
///   never a cached guess: it becomes the next ledger baseline.
/// - `update` fails with `ConcurrentModification` if `known_version` is
///   stale.
/// - Implementations must be `Send + Sync`; the engine may call write
///   methods from several worker threads at once.
pub trait Repository: Send + Sync {
    /// Entity identifier.
    type Id: EntityKey;
    /// Entity version token.
    type Version: VersionToken;
    /// Entity representation handed to the mapper.
    type Entity: Clone + Send + Sync;

    /// Enumerates every entity, restricted to `window` if given.
    ///
    /// Must be complete: a partial enumeration would make entities look
    /// deleted.
    fn enumerate(
        &self,
        window: Option<&TimeWindow>,
    ) -> AdapterResult<Vec<VersionEntry<Self::Id, Self::Version>>>;

    /// Returns the current versions of specific ids, regardless of any
    /// window. Ids that no longer exist are omitted.
    fn versions(&self, ids: &[Self::Id])
        -> AdapterResult<Vec<VersionEntry<Self::Id, Self::Version>>>;

    /// Loads entities. Ids that no longer exist are omitted.
    fn fetch(&self, ids: &[Self::Id]) -> AdapterResult<HashMap<Self::Id, Self::Entity>>;

    /// Creates an entity from a blank one passed through `initializer`.
    fn create(
        &self,
        initializer: &EntityTransform<'_, Self::Entity>,
    ) -> AdapterResult<VersionEntry<Self::Id, Self::Version>>;

    /// Updates an entity through `modifier`.
    ///
    /// `cached` is the current entity if the caller already loaded it;
    /// otherwise the repository loads it.
    fn update(
        &self,
        id: &Self::Id,
        known_version: &Self::Version,
        cached: Option<Self::Entity>,
        modifier: &EntityTransform<'_, Self::Entity>,
    ) -> AdapterResult<VersionEntry<Self::Id, Self::Version>>;

    /// Deletes an entity. Returns `false` if it was already gone.
    fn delete(&self, id: &Self::Id) -> AdapterResult<bool>;
}

/// Translates entity content between side A and side B.
///
/// Mappers are pure with respect to engine state.
pub trait EntityMapper<AE, BE>: Send + Sync {
    /// Maps `source` onto `target` (blank or current B-entity).
    fn map_a_to_b(&self, source: &AE, target: BE) -> AdapterResult<BE>;

    /// Maps `source` onto `target` (blank or current A-entity).
    fn map_b_to_a(&self, source: &BE, target: AE) -> AdapterResult<AE>;
}
