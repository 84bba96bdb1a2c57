//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use twinsync_core::{Ledger, RelationRecord, VersionEntry};
use twinsync_engine::SyncConfig;
use twinsync_testkit::{memory_sync, MemorySync};

/// Ledger type used by the benchmarks.
pub type BenchLedger = Ledger<String, u64, String, u64>;

/// Enumeration result of one side.
pub type Entries = Vec<VersionEntry<String, u64>>;

/// Generate random entity content of the specified length.
pub fn random_content(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a ledger correlating `a{i}` with `b{i}`, all at version 1.
pub fn generate_ledger(count: usize) -> BenchLedger {
    let mut ledger = Ledger::new();
    ledger.upsert_all(
        (0..count).map(|i| RelationRecord::new(format!("a{i}"), 1, format!("b{i}"), 1)),
    );
    ledger
}

/// Simulate both sides' enumerations against [`generate_ledger`].
///
/// Each known id is changed with probability `churn`, deleted with
/// probability `churn / 4`, and `count * churn` new ids are added per side.
pub fn generate_enumerations(count: usize, churn: f64) -> (Entries, Entries) {
    let mut rng = rand::thread_rng();
    let mut side = |prefix: &str| -> Entries {
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let roll: f64 = rng.gen();
            if roll < churn / 4.0 {
                continue;
            }
            let version = if roll < churn { 2 } else { 1 };
            entries.push(VersionEntry::new(format!("{prefix}{i}"), version));
        }
        let added = (count as f64 * churn) as usize;
        for i in 0..added {
            entries.push(VersionEntry::new(format!("{prefix}new{i}"), 1));
        }
        entries
    };
    let a = side("a");
    let b = side("b");
    (a, b)
}

/// Create a memory synchronizer whose side A holds `count` entities.
pub fn populated_sync(config: SyncConfig, count: usize, content_len: usize) -> MemorySync {
    let sync = memory_sync(config);
    for _ in 0..count {
        sync.repository_a().insert(random_content(content_len));
    }
    sync
}
