//! Core type definitions shared by both sides of a synchronization.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// An opaque, side-scoped entity identifier.
///
/// Identifiers are stable across updates and unique within their side.
/// Ordering is only used to make iteration deterministic; the engine never
/// assigns meaning to it.
pub trait EntityKey:
    Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> EntityKey for T where
    T: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// An opaque version or etag token.
///
/// Versions are compared for equality only. A repository must produce a new
/// token on every successful write.
pub trait VersionToken:
    Clone + Eq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> VersionToken for T where
    T: Clone + Eq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// One of the two stores being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The first store of a profile.
    A,
    /// The second store of a profile.
    B,
}

impl Side {
    /// Returns the other side.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// An entity's identity and current version as reported by a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry<Id, V> {
    /// The entity identifier.
    pub id: Id,
    /// The version the repository currently holds.
    pub version: V,
    /// Last modification time, if the repository can supply one.
    ///
    /// Only consulted by automatic conflict resolution. Never persisted.
    pub modified: Option<DateTime<Utc>>,
}

impl<Id, V> VersionEntry<Id, V> {
    /// Creates an entry without modification time.
    pub fn new(id: Id, version: V) -> Self {
        Self {
            id,
            version,
            modified: None,
        }
    }

    /// Attaches a modification time.
    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// A half-open time range `[from, to)` restricting enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window. Returns `None` unless `from < to`.
    #[must_use]
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        (from < to).then_some(Self { from, to })
    }

    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn side_other() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
        assert_eq!(Side::A.to_string(), "A");
    }

    #[test]
    fn window_is_half_open() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = from + Duration::days(7);
        let window = TimeWindow::new(from, to).unwrap();

        assert!(window.contains(from));
        assert!(window.contains(to - Duration::seconds(1)));
        assert!(!window.contains(to));
        assert!(!window.contains(from - Duration::seconds(1)));
    }

    #[test]
    fn window_rejects_empty_range() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(TimeWindow::new(at, at).is_none());
        assert!(TimeWindow::new(at + Duration::hours(1), at).is_none());
    }

    #[test]
    fn version_entry_builder() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let entry = VersionEntry::new("a1", 3u64).with_modified(at);
        assert_eq!(entry.id, "a1");
        assert_eq!(entry.version, 3);
        assert_eq!(entry.modified, Some(at));
    }
}
