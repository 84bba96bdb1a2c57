//! # TwinSync Engine
//!
//! Reconciles two independent entity stores through a relation ledger.
//!
//! This crate provides:
//! - Change classification of each side against the ledger
//! - Pair matching of correlated and newly added entities
//! - One-way and two-way sync strategies with conflict policies
//! - No-throw execution of sync states
//! - The [`Synchronizer`] orchestrator with batching, worker threads,
//!   progress reporting and cancellation
//!
//! ## Architecture
//!
//! A run is a pipeline:
//! 1. Load the ledger and enumerate both sides
//! 2. Classify every id per side (`Added`, `Changed`, `Unchanged`, `Deleted`)
//! 3. Match ids into pairs via the ledger
//! 4. Let the strategy choose a [`SyncState`] per pair
//! 5. Execute states in batches and fold the results into the ledger
//! 6. Persist the ledger
//!
//! Steps 2 to 4 are pure. Only step 5 touches the repositories.
//!
//! ## Key Invariants
//!
//! - Enumeration failures abort a run before any write
//! - A failing pair never affects other pairs
//! - The ledger baseline is always the version a repository returned
//! - Running twice without external changes does nothing the second time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod config;
mod error;
mod factory;
mod matcher;
mod progress;
mod state;
mod strategy;
mod synchronizer;

pub use classifier::{classify, Classification, ClassifiedSide, SideChange};
pub use config::{ConflictPolicy, OneWayMode, SyncConfig, SyncDirection};
pub use error::{SyncError, SyncResult};
pub use factory::StateFactory;
pub use matcher::{match_pairs, SyncPair};
pub use progress::{CountingProgress, NoProgress, ProgressReporter};
pub use state::{
    ExecutionContext, ExecutionOutcome, PairFailure, RequiredEntities, SyncAction, SyncState,
};
pub use strategy::{strategy_for, OneWayStrategy, SyncStrategy, TwoWayStrategy};
pub use synchronizer::{
    CancelHandle, LedgerOf, RelationOf, StateOf, SyncPhase, SyncReport, SyncStats, Synchronizer,
};
