//! # TwinSync Core
//!
//! Identity, ledger and repository contracts for the TwinSync
//! reconciliation engine.
//!
//! This crate provides:
//! - [`EntityKey`] / [`VersionToken`] bounds for opaque ids and versions
//! - [`RelationRecord`] and the in-memory [`Ledger`] of correlations
//! - [`LedgerStore`] persistence with file and memory implementations
//! - [`Repository`] and [`EntityMapper`] collaborator traits
//! - [`MemoryRepository`] for tests and ephemeral stores
//!
//! This crate holds no synchronization logic; see `twinsync_engine`.
//!
//! ## Key Invariants
//!
//! - A ledger holds at most one record per A-id and one per B-id
//! - Versions are compared for equality only
//! - Ledger saves are atomic: a failed save leaves the previous ledger

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod ledger;
mod memory;
mod relation;
mod repository;
mod types;

pub use error::{AdapterError, AdapterResult, LedgerError, LedgerResult};
pub use ledger::{
    decode_ledger, encode_ledger, validate_profile, Ledger, LedgerStore, MemoryLedgerStore,
    RawLedger, RawRecord, LEDGER_FORMAT_VERSION, LEDGER_MAGIC,
};
#[cfg(feature = "std")]
pub use ledger::{list_profiles, FileLedgerStore};
pub use memory::{CallCounts, MemoryRepository};
pub use relation::RelationRecord;
pub use repository::{EntityMapper, EntityTransform, Repository};
pub use types::{EntityKey, Side, TimeWindow, VersionEntry, VersionToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
