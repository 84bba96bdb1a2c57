//! Inspect command implementation.

use super::ledger_file;
use serde::Serialize;
use std::fs;
use std::path::Path;
use twinsync_core::{list_profiles, RawLedger, RawRecord};


/// One profile found in a ledger directory.
#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    /// Profile name.
    pub name: String,
    /// Ledger file size in bytes.
    pub size: u64,
    /// Whether a lock file exists next to the ledger.
    pub lock_file: bool,
}

/// Header and records of one profile's ledger.
#[derive(Debug, Serialize)]
pub struct LedgerView {
    /// Ledger file path.
    pub path: String,
    /// Ledger file size in bytes.
    pub size: u64,
    /// Profile stored in the ledger body.
    pub profile: String,
    /// Format version from the header.
    pub format_version: u16,
    /// Number of relation records.
    pub record_count: usize,
    /// The relation records.
    pub records: Vec<RawRecord>,
}

/// Runs the inspect command.
pub fn run(
    dir: &Path,
    profile: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("No ledger directory at {:?}", dir).into());
    }

    match profile {
        None => {
            let profiles = summarize_profiles(dir)?;
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&profiles)?),
                _ => print_profiles(dir, &profiles),
            }
        }
        Some(profile) => {
            let view = load_view(dir, profile)?;
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&view)?),
                _ => print_view(&view),
            }
        }
    }

    Ok(())
}

/// Lists every profile with a ledger file in `dir`.
pub fn summarize_profiles(dir: &Path) -> Result<Vec<ProfileSummary>, Box<dyn std::error::Error>> {
    let mut summaries = Vec::new();
    for name in list_profiles(dir)? {
        let size = fs::metadata(ledger_file(dir, &name)?)?.len();
        let lock_file = dir.join(format!("{name}.lock")).exists();
        summaries.push(ProfileSummary { name, size, lock_file });
    }
    tracing::debug!(profiles = summaries.len(), "listed ledger directory");
    Ok(summaries)
}

/// Decodes one profile's ledger without knowing its id and version types.
pub fn load_view(dir: &Path, profile: &str) -> Result<LedgerView, Box<dyn std::error::Error>> {
    let path = ledger_file(dir, profile)?;
    if !path.exists() {
        return Err(format!("No ledger for profile {profile:?} in {:?}", dir).into());
    }

    let data = fs::read(&path)?;
    let raw = RawLedger::decode(&data)?;
    tracing::debug!(records = raw.records.len(), version = raw.format_version, "decoded ledger");

    Ok(LedgerView {
        path: path.display().to_string(),
        size: data.len() as u64,
        profile: raw.profile,
        format_version: raw.format_version,
        record_count: raw.records.len(),
        records: raw.records,
    })
}

fn print_profiles(dir: &Path, profiles: &[ProfileSummary]) {
    println!("TwinSync Ledger Directory");
    println!("=========================");
    println!();
    println!("Path: {}", dir.display());
    println!();
    if profiles.is_empty() {
        println!("No ledgers found");
        return;
    }
    println!("Profiles:");
    for profile in profiles {
        let lock = if profile.lock_file { " (lock file present)" } else { "" };
        println!("  {:<24} {}{}", profile.name, format_size(profile.size), lock);
    }
}

fn print_view(view: &LedgerView) {
    println!("TwinSync Ledger Inspection");
    println!("==========================");
    println!();
    println!("Path:           {}", view.path);
    println!("Size:           {}", format_size(view.size));
    println!("Profile:        {}", view.profile);
    println!("Format version: {}", view.format_version);
    println!("Records:        {}", view.record_count);

    if !view.records.is_empty() {
        println!();
        println!("  {:<28} {:<16} {:<28} {:<16}", "A id", "A version", "B id", "B version");
        for record in &view.records {
            println!(
                "  {:<28} {:<16} {:<28} {:<16}",
                render(&record.a_id),
                render(&record.a_version),
                render(&record.b_id),
                render(&record.b_version)
            );
        }
    }
}

/// Renders a CBOR value compactly for text output.
pub fn render(value: &ciborium::Value) -> String {
    match value {
        ciborium::Value::Text(text) => text.clone(),
        ciborium::Value::Integer(n) => i128::from(*n).to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
