//! CLI command implementations.

pub mod inspect;
pub mod verify;

use std::path::{Path, PathBuf};
use twinsync_core::validate_profile;

/// Path of a profile's ledger file.
pub fn ledger_file(dir: &Path, profile: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    validate_profile(profile)?;
    Ok(dir.join(format!("{profile}.ledger")))
}
