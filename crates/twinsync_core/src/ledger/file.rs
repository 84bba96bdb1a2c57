//! Directory-backed ledger store.
//!
//! One directory holds the ledgers of any number of profiles:
//!
//! ```text
//! <dir>/
//! ├─ calendar.ledger       # Persisted ledger of profile "calendar"
//! ├─ calendar.lock         # Advisory lock held while a store is open
//! └─ tasks.ledger
//! ```

use super::format::{decode_ledger, encode_ledger};
use super::store::{validate_profile, LedgerStore};
use super::Ledger;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{EntityKey, VersionToken};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LEDGER_EXT: &str = "ledger";
const LOCK_EXT: &str = "lock";
const TEMP_EXT: &str = "ledger.tmp";

/// A ledger store persisting one profile inside a directory.
///
/// The store holds an exclusive advisory lock on `<profile>.lock` for its
/// whole lifetime, so two processes cannot own the same profile.
///
/// # Example
///
/// ```rust,ignore
/// use twinsync_core::{FileLedgerStore, LedgerStore};
///
/// let store = FileLedgerStore::open(Path::new("state"), "calendar")?;
/// let ledger: Ledger<String, u64, String, String> = store.load()?;
/// ```
#[derive(Debug)]
pub struct FileLedgerStore {
    dir: PathBuf,
    profile: String,
    _lock_file: File,
}

impl FileLedgerStore {
    /// Opens the store for `profile`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProfile` for unusable names, `Locked` if another
    /// handle owns the profile, or an I/O error.
    pub fn open(dir: &Path, profile: &str) -> LedgerResult<Self> {
        validate_profile(profile)?;
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(format!("{profile}.{LOCK_EXT}"));
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(LedgerError::Locked {
                profile: profile.to_string(),
            });
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            profile: profile.to_string(),
            _lock_file: lock_file,
        })
    }

    /// Path of the persisted ledger file.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{LEDGER_EXT}", self.profile))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{TEMP_EXT}", self.profile))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> LedgerResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> LedgerResult<()> {
        Ok(())
    }
}

impl<AI, AV, BI, BV> LedgerStore<AI, AV, BI, BV> for FileLedgerStore
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
        let path = self.ledger_path();
        if !path.exists() {
            return Ok(Ledger::new());
        }

        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        decode_ledger(&data, &self.profile)
    }

    /// Write-then-rename: the previous ledger survives any failure before
    /// the rename.
    fn save(&self, ledger: &Ledger<AI, AV, BI, BV>) -> LedgerResult<()> {
        let data = encode_ledger(&self.profile, ledger)?;
        let temp_path = self.temp_path();

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.ledger_path())?;
        self.sync_directory()?;

        tracing::debug!(
            profile = %self.profile,
            records = ledger.len(),
            bytes = data.len(),
            "ledger saved"
        );
        Ok(())
    }
}

/// Lists the profiles that have a persisted ledger in `dir`, sorted.
pub fn list_profiles(dir: &Path) -> LedgerResult<Vec<String>> {
    let mut profiles = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(LEDGER_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if validate_profile(stem).is_ok() {
                profiles.push(stem.to_string());
            }
        }
    }
    profiles.sort();
    Ok(profiles)
}
