//! Error types for repositories, mappers and ledger persistence.

use std::io;
use thiserror::Error;

/// Result type for repository and mapper calls.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised by a repository adapter or an entity mapper.
///
/// These are always scoped to a single entity. The engine downgrades them
/// to a no-op for the affected pair and retries on the next run.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The entity does not exist (anymore).
    #[error("entity not found: {id}")]
    NotFound {
        /// Debug rendering of the entity id.
        id: String,
    },

    /// The entity was modified after the known version was read.
    #[error("concurrent modification of entity {id}")]
    ConcurrentModification {
        /// Debug rendering of the entity id.
        id: String,
    },

    /// Mapping between the two entity representations failed.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// The backing store rejected or failed the call.
    #[error("backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },
}

impl AdapterError {
    /// Creates a not-found error for any debuggable id.
    pub fn not_found(id: &impl std::fmt::Debug) -> Self {
        Self::NotFound {
            id: format!("{id:?}"),
        }
    }

    /// Creates a concurrent-modification error for any debuggable id.
    pub fn concurrent(id: &impl std::fmt::Debug) -> Self {
        Self::ConcurrentModification {
            id: format!("{id:?}"),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Creates a retryable backend error.
    pub fn backend_retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable backend error.
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Backend { retryable, .. } => *retryable,
            AdapterError::ConcurrentModification { .. } => true,
            AdapterError::NotFound { .. } | AdapterError::Mapping(_) => false,
        }
    }
}

/// Errors that can occur while loading or persisting a relation ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The persisted ledger violates its format or invariants.
    #[error("ledger corrupted: {0}")]
    Corrupted(String),

    /// The ledger format version is newer than this build understands.
    #[error("unsupported ledger version: {0}")]
    UnsupportedVersion(u16),

    /// Another process owns the profile.
    #[error("ledger locked: another process owns profile {profile}")]
    Locked {
        /// The locked profile.
        profile: String,
    },

    /// The profile name cannot be used as a namespace.
    #[error("invalid profile name: {0:?}")]
    InvalidProfile(String),
}

impl LedgerError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec(message.to_string())
    }
}
