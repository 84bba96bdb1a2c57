//! Ledger persistence contract and the in-memory store.

use super::format::{decode_ledger, encode_ledger};
use super::Ledger;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{EntityKey, VersionToken};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Maximum profile name length.
const MAX_PROFILE_LEN: usize = 64;

/// Persistence for one profile's relation ledger.
///
/// A store is one logical namespace. `save` must be atomic: after a failed
/// save, `load` still returns the previously saved ledger.
pub trait LedgerStore<AI, AV, BI, BV>: Send + Sync
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    /// The profile this store persists.
    fn profile(&self) -> &str;

    /// Loads the ledger. A store that was never saved yields an empty ledger.
    fn load(&self) -> LedgerResult<Ledger<AI, AV, BI, BV>>;

    /// Replaces the persisted ledger.
    fn save(&self, ledger: &Ledger<AI, AV, BI, BV>) -> LedgerResult<()>;
}

/// Checks that a profile name is usable as a namespace (and file name).
pub fn validate_profile(profile: &str) -> LedgerResult<()> {
    let valid = !profile.is_empty()
        && profile.len() <= MAX_PROFILE_LEN
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidProfile(profile.to_string()))
    }
}

/// A ledger store that keeps the encoded ledger in memory.
///
/// The ledger goes through the same encoding as [`super::FileLedgerStore`],
/// so round-trips exercise the real format. Save failures can be injected
/// for testing.
#[derive(Debug)]
pub struct MemoryLedgerStore {
    profile: String,
    bytes: RwLock<Option<Vec<u8>>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    pub fn new(profile: impl Into<String>) -> LedgerResult<Self> {
        let profile = profile.into();
        validate_profile(&profile)?;
        Ok(Self {
            profile,
            bytes: RwLock::new(None),
            fail_saves: AtomicBool::new(false),
            saves: AtomicU64::new(0),
        })
    }

    /// Makes subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// The raw persisted bytes, if any.
    pub fn raw_bytes(&self) -> Option<Vec<u8>> {
        self.bytes.read().clone()
    }
}

impl<AI, AV, BI, BV> LedgerStore<AI, AV, BI, BV> for MemoryLedgerStore
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    fn profile(&self) -> &str {
        &self.profile
    }

    fn load(&self) -> LedgerResult<Ledger<AI, AV, BI, BV>> {
        match self.bytes.read().as_deref() {
            Some(bytes) => decode_ledger(bytes, &self.profile),
            None => Ok(Ledger::new()),
        }
    }

    fn save(&self, ledger: &Ledger<AI, AV, BI, BV>) -> LedgerResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected save failure",
            )));
        }

        let encoded = encode_ledger(&self.profile, ledger)?;
        *self.bytes.write() = Some(encoded);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
