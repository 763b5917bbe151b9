//! Action-result envelope (§6, §7): every facade call returns one of
//! these instead of a JSON-RPC error object, since the wire transport
//! itself is out of scope here.

use orchestrator_core::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The uniform result every `ToolFacade` method returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    /// `{success:false, error: "<kind>: <message>"}` per the propagation
    /// policy: the error's `kind()` prefixes its display message.
    pub fn err(error: OrchestratorError) -> Self {
        Self {
            success: false,
            payload: Value::Null,
            error: Some(format!("{}: {}", error.kind(), error)),
        }
    }

    pub fn bad_action(surface: &str, action: &str) -> Self {
        Self::err(OrchestratorError::Validation(format!(
            "unknown action '{action}' for {surface}"
        )))
    }
}

/// Converts any serializable success value plus a fallible inner
/// operation into an [`ActionResult`] in one step.
pub fn from_result<T: Serialize>(result: orchestrator_core::error::Result<T>) -> ActionResult {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(payload) => ActionResult::ok(payload),
            Err(e) => ActionResult::err(OrchestratorError::from(e)),
        },
        Err(e) => ActionResult::err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_prefixes_with_kind() {
        let result = ActionResult::err(OrchestratorError::TaskNotFound("T1".into()));
        assert!(!result.success);
        assert_eq!(result.error.unwrap(), "NotFound: Task not found: T1");
    }

    #[test]
    fn from_result_ok_serializes_payload() {
        let result: ActionResult = from_result(Ok(42u32));
        assert!(result.success);
        assert_eq!(result.payload, serde_json::json!(42));
    }
}
