//! Orchestrator Rules Library
//!
//! Rule library parsing, storage, inheritance resolution, composition,
//! caching, and client synchronization for the rule orchestration
//! platform. Builds on [`orchestrator_core`]'s error type and
//! filesystem discipline.
//!
//! # Architecture
//!
//! - [`models`] - Rule file, inheritance, composition, cache, and sync types
//! - [`parser`] - Format detection and section/reference/variable extraction
//! - [`store`] - Filesystem access to a rule library (list/backup/restore/clean)
//! - [`inheritance`] - Parent-of detection, inheritance classification, cycle detection
//! - [`composer`] - Inheritance composition and N-way composition strategies
//! - [`cache`] - Two-level LRU cache with TTL and tag invalidation
//! - [`client_sync`] - Client registration, auth, rate limiting, and sync operations
//!
//! # Example
//!
//! ```rust,no_run
//! use orchestrator_rules::store::RuleStore;
//!
//! # async fn run() -> orchestrator_core::error::Result<()> {
//! let store = RuleStore::new("/project/.cursor/rules");
//! let core_rules = store.load_core().await?;
//! # let _ = core_rules;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client_sync;
pub mod composer;
pub mod inheritance;
pub mod models;
pub mod parser;
pub mod store;

pub use cache::{CacheTier, CacheTierConfig};
pub use client_sync::{ClientSync, SyncEvent, SyncSubscriber};
pub use composer::RuleComposer;
pub use inheritance::InheritanceResolver;
pub use parser::RuleParser;
pub use store::{RuleInfo, RuleStore};

/// Current version of the rules crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_version_is_populated() {
        assert!(!VERSION.is_empty());
    }
}
