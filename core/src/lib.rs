//! Orchestrator Core Library
//!
//! Foundational domain models, business logic, and trait interfaces for
//! the multi-project, multi-agent task orchestration engine. Every other
//! crate in the workspace (`orchestrator-rules`, `orchestrator-protocol`,
//! `orchestrator-server`) depends on the types and traits defined here.
//!
//! # Architecture
//!
//! - [`ids`] - Task/project/tree/agent/user identifiers
//! - [`models`] - Core domain models (Task, Project, ContextRecord, ...)
//! - [`error`] - Error types and result handling
//! - [`validation`] - Business-rule validation
//! - [`scope`] - Per-(user,project,tree) mutex registry
//! - [`fsutil`] - Atomic JSON read/write helpers
//! - [`task_store`] - Per-scope task repository
//! - [`context_store`] - Per-task structured context repository
//! - [`project_registry`] - Project/tree/agent catalog
//! - [`git`] - Git subprocess boundary used by agent orchestration
//! - [`agent_orchestrator`] - Health, sync, cleanup, integrity, rebalance
//! - [`project_analyzer`] - Repository scan + phase-specific guidance
//! - [`auto_rule_generator`] - Task+role+analysis → prompt artifact
//!
//! # Example
//!
//! ```rust
//! use orchestrator_core::{models::NewTask, validation::TaskValidator};
//!
//! let new_task = NewTask {
//!     title: "Design the API surface".to_string(),
//!     description: "Draft the manage_* action contracts".to_string(),
//!     status: None,
//!     priority: None,
//!     details: String::new(),
//!     estimated_effort: None,
//!     assignees: vec!["@coding-agent".to_string()],
//!     labels: Default::default(),
//!     due_date: None,
//!     dependencies: vec![],
//!     project_id: "web_app".to_string(),
//! };
//!
//! TaskValidator::validate_new_task(&new_task).unwrap();
//! ```

pub mod agent_orchestrator;
pub mod auto_rule_generator;
pub mod context_store;
pub mod error;
pub mod fsutil;
pub mod git;
pub mod ids;
pub mod models;
pub mod project_analyzer;
pub mod project_registry;
pub mod scope;
pub mod task_store;
pub mod validation;

pub use error::{OrchestratorError, Result};
pub use ids::{AgentId, ProjectId, TaskId, TreeId, UserId};
pub use scope::{ScopeKey, ScopeLocks};
pub use validation::TaskValidator;

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
