//! Configuration for synchronization runs.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twinsync_core::{validate_profile, Side, TimeWindow};

/// What a one-way run does with entities that exist only in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OneWayMode {
    /// The mirror becomes an exact copy: its own additions are deleted.
    Replicate,
    /// The mirror keeps its own additions, untracked.
    Merge,
}

/// Which way changes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDirection {
    /// A is authoritative, B mirrors it.
    OneWayToB(OneWayMode),
    /// B is authoritative, A mirrors it.
    OneWayToA(OneWayMode),
    /// Changes flow both ways; conflicts use the conflict policy.
    TwoWay,
}

impl SyncDirection {
    /// Returns the authoritative side, or `None` for two-way.
    pub fn source(&self) -> Option<Side> {
        match self {
            SyncDirection::OneWayToB(_) => Some(Side::A),
            SyncDirection::OneWayToA(_) => Some(Side::B),
            SyncDirection::TwoWay => None,
        }
    }
}

/// How a two-way run settles entities changed on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Side A always wins.
    PreferA,
    /// Side B always wins.
    PreferB,
    /// The later modification wins.
    Automatic {
        /// Winner when a modification time is missing or both are equal.
        tie_break: Side,
    },
}

impl ConflictPolicy {
    /// Returns the winning side of a change-change conflict.
    pub fn winner(
        &self,
        a_modified: Option<DateTime<Utc>>,
        b_modified: Option<DateTime<Utc>>,
    ) -> Side {
        match self {
            ConflictPolicy::PreferA => Side::A,
            ConflictPolicy::PreferB => Side::B,
            ConflictPolicy::Automatic { tie_break } => match (a_modified, b_modified) {
                (Some(a), Some(b)) if a > b => Side::A,
                (Some(a), Some(b)) if b > a => Side::B,
                _ => *tie_break,
            },
        }
    }

    /// Returns the side a policy prefers outright, if any.
    pub fn preferred(&self) -> Option<Side> {
        match self {
            ConflictPolicy::PreferA => Some(Side::A),
            ConflictPolicy::PreferB => Some(Side::B),
            ConflictPolicy::Automatic { .. } => None,
        }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Automatic { tie_break: Side::A }
    }
}

/// Configuration for a synchronization profile.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Profile name; namespaces the ledger.
    pub profile: String,
    /// Direction of the sync.
    pub direction: SyncDirection,
    /// Conflict policy (two-way only).
    pub conflict_policy: ConflictPolicy,
    /// Restricts enumeration to a time range.
    pub window: Option<TimeWindow>,
    /// Number of pairs executed between ledger updates.
    pub batch_size: usize,
    /// Maximum number of worker threads per batch.
    pub workers: usize,
    /// Persist the ledger after every batch.
    pub checkpoint_each_batch: bool,
}

impl SyncConfig {
    /// Creates a two-way configuration with default settings.
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            direction: SyncDirection::TwoWay,
            conflict_policy: ConflictPolicy::default(),
            window: None,
            batch_size: 100,
            workers: 4,
            checkpoint_each_batch: false,
        }
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Restricts enumeration to a time window.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enables or disables per-batch ledger checkpoints.
    pub fn with_checkpoint_each_batch(mut self, enabled: bool) -> Self {
        self.checkpoint_each_batch = enabled;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        validate_profile(&self.profile)
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        if self.batch_size == 0 {
            return Err(SyncError::Configuration("batch_size must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(SyncError::Configuration("workers must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
