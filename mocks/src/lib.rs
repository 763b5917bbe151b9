//! Test data construction helpers for the orchestrator crates.
//!
//! This crate provides:
//! - Fluent builders for `Task`, `Project` and `ContextRecord`
//! - Realistic random data generators (via `fake`/`rand`) and proptest
//!   strategies for property-based tests
//! - Canned fixtures covering every `TaskStatus`

pub mod builders;
pub mod fixtures;
pub mod generators;

pub use builders::*;
pub use fixtures::*;
pub use generators::*;
