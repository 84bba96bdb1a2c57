//! Error types for the sync engine.

use thiserror::Error;
use twinsync_core::{AdapterError, LedgerError, Side};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a synchronization run.
///
/// Per-pair adapter failures never surface here; they are downgraded by
/// the executor and reported in [`SyncReport::failures`](crate::SyncReport).
#[derive(Error, Debug)]
pub enum SyncError {
    /// Enumerating one side failed. Nothing was written.
    #[error("enumeration of side {side} failed: {source}")]
    Enumeration {
        /// The side whose repository failed.
        side: Side,
        /// The adapter error.
        #[source]
        source: AdapterError,
    },

    /// Loading or persisting the ledger failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Creates an enumeration error for a side.
    pub fn enumeration(side: Side, source: AdapterError) -> Self {
        Self::Enumeration { side, source }
    }

    /// Returns true if running again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Enumeration { source, .. } => source.is_retryable(),
            SyncError::Ledger(LedgerError::Io(_)) => true,
            SyncError::Ledger(LedgerError::Locked { .. }) => true,
            SyncError::InvalidStateTransition { .. } => true,
            _ => false,
        }
    }
}
