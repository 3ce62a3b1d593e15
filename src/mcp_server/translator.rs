//! Maps backend and validation outcomes to `tools/call` results.
//!
//! Nothing here returns an error: every outcome of a single call becomes a
//! `ToolCallResult` so the session never sees a per-call failure.

use crate::backend::BackendResponse;

use super::errors::ToolError;
use super::types::ToolCallResult;

/// Prefix for backend-reported (`code != 0`) failures.
pub const BACKEND_ERROR_PREFIX: &str = "Error from stock API: ";

/// `code == 0` → `[data]`; otherwise an error-flagged `msg`.
pub fn from_backend_response(response: BackendResponse) -> ToolCallResult {
    if response.is_success() {
        ToolCallResult::text(response.data)
    } else {
        ToolCallResult::error(format!("{BACKEND_ERROR_PREFIX}{}", response.msg))
    }
}

/// Any per-call error → error-flagged result with its display text.
pub fn from_tool_error(err: &ToolError) -> ToolCallResult {
    ToolCallResult::error(err.to_string())
}

/// Collapse a handler outcome into a result.
pub fn translate(outcome: Result<ToolCallResult, ToolError>) -> ToolCallResult {
    match outcome {
        Ok(result) => result,
        Err(err) => from_tool_error(&err),
    }
}
