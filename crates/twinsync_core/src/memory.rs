//! In-memory repository for testing and ephemeral stores.

use crate::error::{AdapterError, AdapterResult};
use crate::repository::{EntityTransform, Repository};
use crate::types::{TimeWindow, VersionEntry};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct StoredEntity<E> {
    entity: E,
    version: u64,
    modified: DateTime<Utc>,
    occurs_at: Option<DateTime<Utc>>,
}

impl<E> StoredEntity<E> {
    fn entry(&self, id: &str) -> VersionEntry<String, u64> {
        VersionEntry::new(id.to_string(), self.version).with_modified(self.modified)
    }
}

#[derive(Debug)]
struct MemoryState<E> {
    entities: BTreeMap<String, StoredEntity<E>>,
    next_id: u64,
    next_version: u64,
}

impl<E> MemoryState<E> {
    fn allocate_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

/// Number of repository calls made through the [`Repository`] trait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `enumerate` calls.
    pub enumerations: u64,
    /// `versions` calls.
    pub version_queries: u64,
    /// `fetch` calls.
    pub fetches: u64,
    /// `create` calls.
    pub creates: u64,
    /// `update` calls.
    pub updates: u64,
    /// `delete` calls.
    pub deletes: u64,
}

impl CallCounts {
    /// Number of write calls (create, update, delete).
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug, Default)]
struct Counters {
    enumerations: AtomicU64,
    version_queries: AtomicU64,
    fetches: AtomicU64,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

/// A thread-safe in-memory repository.
///
/// Ids are `"<prefix><n>"` strings and versions are a repository-wide
/// increasing counter, so every write yields a version never seen before.
/// Entities may carry an occurrence time used for window filtering;
/// entities without one are always enumerated.
///
/// Helper methods (`insert`, `modify`, `remove`) simulate changes made by
/// other clients of the store. They bypass the call counters and failure
/// injection, which only apply to [`Repository`] calls.
#[derive(Debug)]
pub struct MemoryRepository<E> {
    prefix: String,
    state: RwLock<MemoryState<E>>,
    counters: Counters,
    fail_enumeration: AtomicBool,
    failing_ids: RwLock<HashSet<String>>,
}

impl<E: Clone + Default + Send + Sync> MemoryRepository<E> {
    /// Creates an empty repository issuing ids with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: RwLock::new(MemoryState {
                entities: BTreeMap::new(),
                next_id: 0,
                next_version: 0,
            }),
            counters: Counters::default(),
            fail_enumeration: AtomicBool::new(false),
            failing_ids: RwLock::new(HashSet::new()),
        }
    }

    /// Inserts an entity without occurrence time.
    pub fn insert(&self, entity: E) -> VersionEntry<String, u64> {
        self.insert_stored(entity, None)
    }

    /// Inserts an entity occurring at `at`.
    pub fn insert_at(&self, entity: E, at: DateTime<Utc>) -> VersionEntry<String, u64> {
        self.insert_stored(entity, Some(at))
    }

    /// Changes an entity, bumping its version.
    pub fn modify(&self, id: &str, f: impl FnOnce(&mut E)) -> Option<VersionEntry<String, u64>> {
        let mut state = self.state.write();
        let version = state.allocate_version();
        let stored = state.entities.get_mut(id)?;
        f(&mut stored.entity);
        stored.version = version;
        stored.modified = Utc::now();
        Some(stored.entry(id))
    }

    /// Removes an entity. Returns false if it did not exist.
    pub fn remove(&self, id: &str) -> bool {
        self.state.write().entities.remove(id).is_some()
    }

    /// Returns a copy of an entity.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<E> {
        self.state.read().entities.get(id).map(|s| s.entity.clone())
    }

    /// Returns the current version of an entity.
    #[must_use]
    pub fn version_of(&self, id: &str) -> Option<u64> {
        self.state.read().entities.get(id).map(|s| s.version)
    }

    /// Overrides the modification time reported for an entity.
    pub fn set_modified(&self, id: &str, at: DateTime<Utc>) -> bool {
        match self.state.write().entities.get_mut(id) {
            Some(stored) => {
                stored.modified = at;
                true
            }
            None => false,
        }
    }

    /// Moves an entity to another occurrence time (or none).
    pub fn set_occurs_at(&self, id: &str, at: Option<DateTime<Utc>>) -> bool {
        match self.state.write().entities.get_mut(id) {
            Some(stored) => {
                stored.occurs_at = at;
                true
            }
            None => false,
        }
    }

    /// All entities in id order.
    #[must_use]
    pub fn entities(&self) -> Vec<(String, E)> {
        self.state
            .read()
            .entities
            .iter()
            .map(|(id, s)| (id.clone(), s.entity.clone()))
            .collect()
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    /// Returns true if no entities are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entities.is_empty()
    }

    /// Makes `enumerate` fail (or succeed again).
    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Makes every update and delete of `id` fail.
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_ids.write().insert(id.to_string());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_enumeration.store(false, Ordering::SeqCst);
        self.failing_ids.write().clear();
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        CallCounts {
            enumerations: self.counters.enumerations.load(Ordering::SeqCst),
            version_queries: self.counters.version_queries.load(Ordering::SeqCst),
            fetches: self.counters.fetches.load(Ordering::SeqCst),
            creates: self.counters.creates.load(Ordering::SeqCst),
            updates: self.counters.updates.load(Ordering::SeqCst),
            deletes: self.counters.deletes.load(Ordering::SeqCst),
        }
    }

    fn insert_stored(
        &self,
        entity: E,
        occurs_at: Option<DateTime<Utc>>,
    ) -> VersionEntry<String, u64> {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = format!("{}{}", self.prefix, state.next_id);
        let version = state.allocate_version();
        let stored = StoredEntity {
            entity,
            version,
            modified: Utc::now(),
            occurs_at,
        };
        let entry = stored.entry(&id);
        state.entities.insert(id, stored);
        entry
    }

    fn check_writable(&self, id: &str) -> AdapterResult<()> {
        if self.failing_ids.read().contains(id) {
            Err(AdapterError::backend_retryable(format!(
                "injected write failure for {id}"
            )))
        } else {
            Ok(())
        }
    }
}

impl<E: Clone + Default + Send + Sync> Repository for MemoryRepository<E> {
    type Id = String;
    type Version = u64;
    type Entity = E;

    fn enumerate(
        &self,
        window: Option<&TimeWindow>,
    ) -> AdapterResult<Vec<VersionEntry<String, u64>>> {
        self.counters.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(AdapterError::backend_retryable("injected enumeration failure"));
        }

        let state = self.state.read();
        Ok(state
            .entities
            .iter()
            .filter(|(_, s)| match (window, s.occurs_at) {
                (Some(window), Some(at)) => window.contains(at),
                _ => true,
            })
            .map(|(id, s)| s.entry(id))
            .collect())
    }

    fn versions(&self, ids: &[String]) -> AdapterResult<Vec<VersionEntry<String, u64>>> {
        self.counters.version_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.entities.get(id).map(|s| s.entry(id)))
            .collect())
    }

    fn fetch(&self, ids: &[String]) -> AdapterResult<HashMap<String, E>> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .entities
                    .get(id)
                    .map(|s| (id.clone(), s.entity.clone()))
            })
            .collect())
    }

    fn create(
        &self,
        initializer: &EntityTransform<'_, E>,
    ) -> AdapterResult<VersionEntry<String, u64>> {
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        let entity = initializer(E::default())?;
        Ok(self.insert_stored(entity, None))
    }

    fn update(
        &self,
        id: &String,
        known_version: &u64,
        cached: Option<E>,
        modifier: &EntityTransform<'_, E>,
    ) -> AdapterResult<VersionEntry<String, u64>> {
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        self.check_writable(id)?;

        let current = match cached {
            Some(entity) => entity,
            None => self.get(id).ok_or_else(|| AdapterError::not_found(id))?,
        };
        // The modifier runs outside the lock; the version check below
        // rejects the write if another writer got in between.
        let updated = modifier(current)?;

        let mut state = self.state.write();
        let version = state.allocate_version();
        let stored = state
            .entities
            .get_mut(id)
            .ok_or_else(|| AdapterError::not_found(id))?;
        if stored.version != *known_version {
            return Err(AdapterError::concurrent(id));
        }
        stored.entity = updated;
        stored.version = version;
        stored.modified = Utc::now();
        Ok(stored.entry(id))
    }

    fn delete(&self, id: &String) -> AdapterResult<bool> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_writable(id)?;
        Ok(self.state.write().entities.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn repo() -> MemoryRepository<String> {
        MemoryRepository::new("m")
    }

    #[test]
    fn insert_assigns_ids_and_versions() {
        let repo = repo();
        let first = repo.insert("one".into());
        let second = repo.insert("two".into());

        assert_eq!(first.id, "m1");
        assert_eq!(second.id, "m2");
        assert_ne!(first.version, second.version);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn every_write_changes_version() {
        let repo = repo();
        let entry = repo.insert("v".into());

        let modified = repo.modify(&entry.id, |e| e.push('!')).unwrap();
        assert_ne!(modified.version, entry.version);

        let updated = repo
            .update(&entry.id, &modified.version, None, &|e| Ok(format!("{e}?")))
            .unwrap();
        assert_ne!(updated.version, modified.version);
        assert_eq!(repo.get(&entry.id).unwrap(), "v!?");
    }

    #[test]
    fn stale_update_is_rejected() {
        let repo = repo();
        let entry = repo.insert("v".into());
        repo.modify(&entry.id, |e| e.push('x'));

        let result = repo.update(&entry.id, &entry.version, None, &|e| Ok(e));
        assert!(matches!(result, Err(AdapterError::ConcurrentModification { .. })));
        assert_eq!(repo.get(&entry.id).unwrap(), "vx");
    }

    #[test]
    fn update_prefers_cached_entity() {
        let repo = repo();
        let entry = repo.insert("stored".into());

        repo.update(&entry.id, &entry.version, Some("cached".into()), &|e| Ok(e))
            .unwrap();
        assert_eq!(repo.get(&entry.id).unwrap(), "cached");
    }

    #[test]
    fn create_runs_initializer_on_blank_entity() {
        let repo = repo();
        let entry = repo.create(&|blank: String| Ok(blank + "fresh")).unwrap();
        assert_eq!(repo.get(&entry.id).unwrap(), "fresh");

        let failed = repo.create(&|_| Err(AdapterError::mapping("nope")));
        assert!(failed.is_err());
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn delete_reports_absence() {
        let repo = repo();
        let entry = repo.insert("v".into());
        assert!(repo.delete(&entry.id).unwrap());
        assert!(!repo.delete(&entry.id).unwrap());
    }

    #[test]
    fn enumerate_filters_by_window() {
        let repo = repo();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let inside = repo.insert_at("in".into(), start + Duration::days(1));
        let outside = repo.insert_at("out".into(), start + Duration::days(30));
        let undated = repo.insert("undated".into());

        let window = TimeWindow::new(start, start + Duration::days(7)).unwrap();
        let ids: Vec<_> = repo
            .enumerate(Some(&window))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();

        assert_eq!(ids, vec![inside.id.clone(), undated.id]);
        assert_eq!(repo.enumerate(None).unwrap().len(), 3);

        let versions = repo.versions(&[outside.id.clone(), "m99".into()]).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id, outside.id);
    }

    #[test]
    fn injected_failures_and_counters() {
        let repo = repo();
        let entry = repo.insert("v".into());

        repo.set_fail_enumeration(true);
        assert!(repo.enumerate(None).is_err());

        repo.fail_writes_for(&entry.id);
        assert!(repo.delete(&entry.id).is_err());
        assert!(repo.update(&entry.id, &entry.version, None, &|e| Ok(e)).is_err());

        repo.clear_failures();
        assert!(repo.enumerate(None).is_ok());
        assert!(repo.delete(&entry.id).unwrap());

        let counts = repo.counts();
        assert_eq!(counts.enumerations, 2);
        assert_eq!(counts.deletes, 2);
        assert_eq!(counts.updates, 1);
        assert_eq!(counts.writes(), 3);
    }
}
