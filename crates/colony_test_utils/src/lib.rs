//! # Colony Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism test harness
//! - Snapshot builders and a recording host double
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
