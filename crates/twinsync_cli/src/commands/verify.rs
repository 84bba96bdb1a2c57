//! Verify command implementation.

use super::ledger_file;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use twinsync_core::RawLedger;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Records whose A-id already appeared.
    pub duplicate_a_ids: usize,
    /// Records whose B-id already appeared.
    pub duplicate_b_ids: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Returns true if no problem was found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(dir: &Path, profile: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = ledger_file(dir, profile)?;
    println!("Verifying ledger {:?}", path);
    println!();

    if !path.exists() {
        println!("Ledger file not found (a profile that never synced has none)");
        return Err("Verification failed".into());
    }

    let result = verify_ledger(&fs::read(&path)?, profile);
    println!(
        "  records checked: {}, duplicate A ids: {}, duplicate B ids: {}",
        result.records_checked, result.duplicate_a_ids, result.duplicate_b_ids
    );
    for error in &result.errors {
        println!("    ERROR: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Ledger verification passed");
        Ok(())
    } else {
        println!("✗ Ledger verification failed");
        Err("Verification failed".into())
    }
}

/// Checks header, checksum, profile and the one-record-per-id invariants.
pub fn verify_ledger(data: &[u8], profile: &str) -> VerifyResult {
    let mut result = VerifyResult::default();

    let raw = match RawLedger::decode(data) {
        Ok(raw) => raw,
        Err(e) => {
            result.errors.push(e.to_string());
            return result;
        }
    };

    if raw.profile != profile {
        result.errors.push(format!(
            "ledger belongs to profile {:?}, expected {:?}",
            raw.profile, profile
        ));
    }

    let mut a_ids = HashSet::new();
    let mut b_ids = HashSet::new();
    for record in &raw.records {
        result.records_checked += 1;
        if !a_ids.insert(canonical(&record.a_id)) {
            result.duplicate_a_ids += 1;
            result.errors.push(format!("duplicate A id {:?}", record.a_id));
        }
        if !b_ids.insert(canonical(&record.b_id)) {
            result.duplicate_b_ids += 1;
            result.errors.push(format!("duplicate B id {:?}", record.b_id));
        }
    }

    tracing::debug!(
        records = result.records_checked,
        errors = result.errors.len(),
        "ledger verified"
    );
    result
}

/// Identity of a decoded id.
fn canonical(value: &ciborium::Value) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinsync_core::{encode_ledger, Ledger, RelationRecord};

    fn sample() -> Vec<u8> {
        let ledger = Ledger::from_records(vec![
            RelationRecord::new("a1".to_string(), 1u64, 10u32, "x".to_string()),
            RelationRecord::new("a2".to_string(), 2u64, 11u32, "y".to_string()),
        ])
        .unwrap();
        encode_ledger("notes", &ledger).unwrap()
    }

    #[test]
    fn valid_ledger_passes() {
        let result = verify_ledger(&sample(), "notes");
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.records_checked, 2);
    }

    #[test]
    fn wrong_profile_fails() {
        let result = verify_ledger(&sample(), "calendar");
        assert!(!result.is_ok());
    }

    #[test]
    fn corruption_fails() {
        let mut bytes = sample();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let result = verify_ledger(&bytes, "notes");
        assert!(result.errors[0].contains("checksum"));

        let mut bytes = sample();
        bytes[..4].copy_from_slice(b"NOPE");
        assert!(!verify_ledger(&bytes, "notes").is_ok());
        assert!(!verify_ledger(&[], "notes").is_ok());
    }
}
