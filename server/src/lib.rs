//! Orchestrator server binary support: configuration, telemetry, and a
//! minimal stdio harness around `ToolFacade`. The MCP wire transport
//! itself is out of scope (see `orchestrator-protocol`); this crate
//! only wires the facade up to a process.

pub mod config;
pub mod stdio;
pub mod telemetry;

pub use config::Config;
pub use stdio::StdioServer;
pub use telemetry::init_telemetry;
