//! Benchmark support for TwinSync.

#![deny(unsafe_code)]

pub mod utils;
