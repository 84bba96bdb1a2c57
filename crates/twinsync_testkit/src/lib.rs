//! # TwinSync Testkit
//!
//! Test utilities for TwinSync.
//!
//! This crate provides:
//! - Fixtures: string-content memory stores, a mapper with failure
//!   injection, memory and file-backed synchronizers
//! - Property-based generators for two-sided scenarios
//!
//! ## Usage
//!
//! ```rust,ignore
//! use twinsync_testkit::prelude::*;
//!
//! #[test]
//! fn test_sync() {
//!     let sync = memory_sync(SyncConfig::new("test"));
//!     sync.repository_a().insert("hello".into());
//!     sync.synchronize(&NoProgress).unwrap();
//!     assert_mirrored(sync.repository_a(), sync.repository_b());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use twinsync_engine::{NoProgress, SyncConfig};
}

pub use fixtures::*;
pub use generators::*;
