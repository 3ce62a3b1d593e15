//! MCP server error types.
//!
//! `ToolError` is local to one call and always becomes an error-flagged
//! result. `SessionError` is the only kind that ends a session.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised while resolving or executing a single tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Unknown tool `{name}`")]
    UnknownTool { name: String },

    /// One or more required arguments were absent or null.
    #[error("Missing required parameters for '{tool}': {}", missing.join(", "))]
    MissingArguments { tool: String, missing: Vec<String> },

    /// An argument could not be read as a string value.
    #[error("Invalid parameter '{param}' for '{tool}': {reason}")]
    InvalidArgument {
        tool: String,
        param: String,
        reason: String,
    },

    /// The backend could not be reached or returned an unusable response.
    #[error("Failed to query stock API: {0}")]
    Backend(#[from] BackendError),

    /// The handler did not finish within the dispatcher's deadline.
    #[error("Tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

/// Errors raised while building the tool registry at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{name}' is already registered")]
    DuplicateTool { name: String },

    #[error("invalid schema for tool '{tool}': {reason}")]
    InvalidSchema { tool: String, reason: String },
}

/// Transport-level failures. These terminate the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read from input stream: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write to output stream: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
