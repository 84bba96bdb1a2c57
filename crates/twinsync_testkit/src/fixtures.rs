//! Test fixtures: mappers, memory and file-backed synchronizers.
//!
//! Entities are plain strings on both sides, so tests can compare the
//! stores' contents directly.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use twinsync_core::{
    AdapterError, AdapterResult, EntityMapper, FileLedgerStore, LedgerStore, MemoryLedgerStore,
    MemoryRepository,
};
use twinsync_engine::{SyncConfig, Synchronizer};

/// Repository type used by the fixtures on both sides.
pub type TestRepository = MemoryRepository<String>;

/// Synchronizer over two memory repositories and a memory ledger.
pub type MemorySync = Synchronizer<TestRepository, TestRepository, TestMapper, MemoryLedgerStore>;

/// Synchronizer over two memory repositories and a file ledger.
pub type FileSync = Synchronizer<TestRepository, TestRepository, TestMapper, FileLedgerStore>;

/// A `(a_id, a_version, b_id, b_version)` ledger tuple.
pub type LedgerTuple = (String, u64, String, u64);

/// Copies content unchanged, failing for content listed as poisoned.
#[derive(Debug, Default)]
pub struct TestMapper {
    poisoned: RwLock<HashSet<String>>,
    panicking: RwLock<HashSet<String>>,
    calls: AtomicU64,
}

impl TestMapper {
    /// Creates a mapper that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes mapping of this exact content fail.
    pub fn poison(&self, content: impl Into<String>) {
        self.poisoned.write().insert(content.into());
    }

    /// Makes mapping of this exact content panic.
    pub fn panic_on(&self, content: impl Into<String>) {
        self.panicking.write().insert(content.into());
    }

    /// Number of mapping calls.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn map(&self, source: &str) -> AdapterResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.poisoned.read().contains(source) {
            return Err(AdapterError::mapping(format!("poisoned content {source:?}")));
        }
        if self.panicking.read().contains(source) {
            panic!("mapper panicked on {source:?}");
        }
        Ok(source.to_string())
    }
}

impl EntityMapper<String, String> for TestMapper {
    fn map_a_to_b(&self, source: &String, _target: String) -> AdapterResult<String> {
        self.map(source)
    }

    fn map_b_to_a(&self, source: &String, _target: String) -> AdapterResult<String> {
        self.map(source)
    }
}

/// Creates a memory-backed synchronizer with empty stores.
///
/// Side A issues ids `a1, a2, ...`, side B issues `b1, b2, ...`.
pub fn memory_sync(config: SyncConfig) -> MemorySync {
    let store = MemoryLedgerStore::new(config.profile.clone()).expect("valid profile");
    Synchronizer::new(
        config,
        TestRepository::new("a"),
        TestRepository::new("b"),
        TestMapper::new(),
        store,
    )
    .expect("valid configuration")
}

/// A temporary ledger directory.
pub struct TempLedgerDir {
    dir: TempDir,
}

impl TempLedgerDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates a synchronizer whose ledger lives in this directory.
    pub fn sync(&self, config: SyncConfig) -> FileSync {
        self.sync_with(config, TestRepository::new("a"), TestRepository::new("b"))
    }

    /// Creates a synchronizer over existing repositories.
    pub fn sync_with(&self, config: SyncConfig, a: TestRepository, b: TestRepository) -> FileSync {
        let store =
            FileLedgerStore::open(self.path(), &config.profile).expect("Failed to open ledger");
        Synchronizer::new(config, a, b, TestMapper::new(), store).expect("valid configuration")
    }
}

impl Default for TempLedgerDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads a store's ledger as sorted tuples.
pub fn ledger_tuples<L>(store: &L) -> Vec<LedgerTuple>
where
    L: LedgerStore<String, u64, String, u64>,
{
    let mut tuples: Vec<_> = store
        .load()
        .expect("Failed to load ledger")
        .into_records()
        .into_iter()
        .map(|r| (r.a_id, r.a_version, r.b_id, r.b_version))
        .collect();
    tuples.sort();
    tuples
}

/// A repository's contents, sorted.
pub fn contents(repo: &TestRepository) -> Vec<String> {
    let mut values: Vec<_> = repo.entities().into_iter().map(|(_, v)| v).collect();
    values.sort();
    values
}

/// Panics unless both repositories hold the same contents.
pub fn assert_mirrored(a: &TestRepository, b: &TestRepository) {
    assert_eq!(contents(a), contents(b), "stores diverged");
}

/// Panics unless every ledger tuple names an existing entity at its
/// current version on both sides.
pub fn assert_ledger_current<L>(store: &L, a: &TestRepository, b: &TestRepository)
where
    L: LedgerStore<String, u64, String, u64>,
{
    for (a_id, a_version, b_id, b_version) in ledger_tuples(store) {
        assert_eq!(a.version_of(&a_id), Some(a_version), "stale A baseline for {a_id}");
        assert_eq!(b.version_of(&b_id), Some(b_version), "stale B baseline for {b_id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinsync_engine::NoProgress;

    #[test]
    fn mapper_poison() {
        let mapper = TestMapper::new();
        mapper.poison("bad");
        assert!(mapper.map_a_to_b(&"bad".to_string(), String::new()).is_err());
        assert_eq!(mapper.map_b_to_a(&"ok".to_string(), String::new()).unwrap(), "ok");
        assert_eq!(mapper.calls(), 2);
    }

    #[test]
    fn memory_fixture_syncs() {
        let sync = memory_sync(SyncConfig::new("fixture"));
        sync.repository_a().insert("x".into());
        sync.synchronize(&NoProgress).unwrap();

        assert_mirrored(sync.repository_a(), sync.repository_b());
        assert_ledger_current(sync.ledger_store(), sync.repository_a(), sync.repository_b());
        assert_eq!(ledger_tuples(sync.ledger_store()).len(), 1);
    }

    #[test]
    fn file_fixture_persists() {
        let dir = TempLedgerDir::new();
        {
            let sync = dir.sync(SyncConfig::new("fixture"));
            sync.repository_b().insert("y".into());
            sync.synchronize(&NoProgress).unwrap();
        }
        assert!(dir.path().join("fixture.ledger").exists());
    }
}
