//! Minimal stdio action loop over [`ToolFacade`].
//!
//! Reads one JSON object per line from stdin, shaped
//! `{"surface": "manage_task", "action": "create", "params": {...}}`
//! (`surface` is one of the `manage_*` tool families, or `call_agent`),
//! dispatches it, and writes the resulting `ActionResult` back to
//! stdout as one JSON line. This is a demonstration harness for
//! exercising the facade end-to-end, not an MCP JSON-RPC transport
//! (that wire protocol is out of scope).

use anyhow::{Context, Result};
use orchestrator_protocol::{ActionResult, ToolFacade};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
struct ActionRequest {
    surface: String,
    action: String,
    #[serde(default)]
    params: Value,
}

pub struct StdioServer {
    facade: ToolFacade,
}

impl StdioServer {
    pub fn new(facade: ToolFacade) -> Self {
        Self { facade }
    }

    pub async fn serve(self) -> Result<()> {
        info!("stdio action loop ready, reading requests from stdin");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    debug!(request = trimmed, "received request");

                    let result = self.dispatch(trimmed).await;
                    let encoded = serde_json::to_string(&result).context("failed to serialize action result")?;
                    stdout.write_all(encoded.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
                Err(e) => {
                    error!(error = %e, "failed to read line from stdin");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, raw: &str) -> ActionResult {
        let request: ActionRequest = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                return ActionResult::err(orchestrator_core::error::OrchestratorError::Validation(format!(
                    "malformed request: {e}"
                )));
            }
        };

        match request.surface.as_str() {
            "manage_project" => self.facade.manage_project(&request.action, request.params).await,
            "manage_task" => self.facade.manage_task(&request.action, request.params).await,
            "manage_subtask" => self.facade.manage_subtask(&request.action, request.params).await,
            "manage_agent" => self.facade.manage_agent(&request.action, request.params).await,
            "manage_context" => self.facade.manage_context(&request.action, request.params).await,
            "manage_rule" => self.facade.manage_rule(&request.action, request.params).await,
            "call_agent" => {
                let name = request
                    .params
                    .get("name_agent")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.facade.call_agent(name).await
            }
            other => ActionResult::bad_action("stdio_server", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_routes_to_matching_surface() {
        let dir = tempfile::tempdir().unwrap();
        let facade = ToolFacade::new(dir.path().join("data"), dir.path().join("repo"));
        let server = StdioServer::new(facade);

        let request = json!({
            "surface": "manage_project",
            "action": "create",
            "params": {"project_id": "demo", "name": "Demo"}
        })
        .to_string();

        let result = server.dispatch(&request).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_surface() {
        let dir = tempfile::tempdir().unwrap();
        let facade = ToolFacade::new(dir.path().join("data"), dir.path().join("repo"));
        let server = StdioServer::new(facade);

        let request = json!({"surface": "manage_nonsense", "action": "noop", "params": {}}).to_string();
        let result = server.dispatch(&request).await;
        assert!(!result.success);
    }
}
