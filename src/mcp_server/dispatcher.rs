//! Request dispatcher. Resolves, validates and executes one tool call.
//!
//! Steps per call:
//! 1. Look up the tool by name (unknown → error result, no backend contact)
//! 2. Coerce arguments to strings (null counts as absent)
//! 3. Check required arguments (missing → error result, no backend contact)
//! 4. Invoke the handler under the call timeout
//! 5. Translate the outcome into a `ToolCallResult`

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::errors::ToolError;
use super::registry::{check_required, ToolRegistry};
use super::translator;
use super::types::{ToolArguments, ToolCallRequest, ToolCallResult};

/// Default timeout for tool call execution (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// Routes `tools/call` requests to registered handlers.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    call_timeout_ms: u64,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    /// Set the tool call timeout in milliseconds.
    pub fn with_call_timeout(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a tool call. Never fails: every per-call error is translated.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> ToolCallResult {
        let start = Instant::now();
        let outcome = self.try_dispatch(name, arguments).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => tracing::info!(
                tool = %name,
                elapsed_ms,
                is_error = result.is_error,
                "tool call finished"
            ),
            Err(e) => tracing::warn!(
                tool = %name,
                elapsed_ms,
                error = %e,
                "tool call failed"
            ),
        }

        translator::translate(outcome)
    }

    async fn try_dispatch(&self, name: &str, arguments: &Value) -> Result<ToolCallResult, ToolError> {
        // 1. Resolve
        let tool = self.registry.lookup(name)?;

        // 2. Coerce
        let arguments = coerce_arguments(name, arguments)?;

        // 3. Validate
        check_required(tool.descriptor, &arguments)?;

        // 4. Invoke
        let request = ToolCallRequest {
            name: name.to_string(),
            arguments,
        };
        tokio::time::timeout(
            Duration::from_millis(self.call_timeout_ms),
            tool.handler.call(&request),
        )
        .await
        .map_err(|_| ToolError::Timeout {
            tool: name.to_string(),
            timeout_ms: self.call_timeout_ms,
        })?
    }
}

/// Convert raw JSON arguments into string values.
///
/// Strings pass through, numbers and booleans are rendered as text, `null`
/// is dropped. Nested objects and arrays are rejected.
pub fn coerce_arguments(tool: &str, arguments: &Value) -> Result<ToolArguments, ToolError> {
    let invalid = |param: &str, reason: &str| ToolError::InvalidArgument {
        tool: tool.to_string(),
        param: param.to_string(),
        reason: reason.to_string(),
    };

    let obj = match arguments {
        Value::Null => return Ok(ToolArguments::new()),
        Value::Object(obj) => obj,
        _ => return Err(invalid("arguments", "expected an object")),
    };

    let mut out = ToolArguments::new();
    for (key, value) in obj {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(invalid(key, "expected a string value"));
            }
        };
        out.insert(key.clone(), text);
    }
    Ok(out)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
