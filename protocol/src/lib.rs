//! Tool-call protocol surface.
//!
//! # Overview
//!
//! This crate is the bridge between the task/project/rule engines in
//! `orchestrator-core` and `orchestrator-rules` and whatever transport
//! carries tool calls in from an AI client. That transport (MCP over
//! stdio, SSE, HTTP, whatever) is deliberately out of scope here: what
//! this crate provides is [`ToolFacade`], a transport-agnostic surface
//! with one `manage_*` method per tool family, each taking a bare
//! action name plus a `serde_json::Value` parameter bag and returning
//! an [`ActionResult`].
//!
//! A caller wiring up a real transport only has to decode its own
//! wire format into `(action: &str, params: Value)` pairs, dispatch to
//! the matching `ToolFacade` method, and re-encode the `ActionResult`
//! — no protocol-specific knowledge leaks into `core` or `rules`.
//!
//! # Usage
//!
//! ```
//! use orchestrator_protocol::ToolFacade;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let facade = ToolFacade::new(dir.path().join("data"), dir.path().join("repo"));
//!
//! let created = facade
//!     .manage_project("create", json!({"project_id": "demo", "name": "Demo"}))
//!     .await;
//! assert!(created.success);
//!
//! let task = facade
//!     .manage_task(
//!         "create",
//!         json!({"project_id": "demo", "title": "Write the onboarding guide"}),
//!     )
//!     .await;
//! assert!(task.success);
//! # Ok(())
//! # }
//! # tokio_test::block_on(run()).unwrap();
//! ```

pub mod error;
pub mod facade;

pub use error::{from_result, ActionResult};
pub use facade::ToolFacade;
