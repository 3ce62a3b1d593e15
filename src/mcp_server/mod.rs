//! MCP server: JSON-RPC over stdio for the stock-data tools.
//!
//! This module handles:
//! - Line-delimited JSON-RPC 2.0 framing on stdin/stdout
//! - The session lifecycle (connect, serve, close on EOF or `shutdown`)
//! - The static tool registry and its schema validation
//! - Tool call dispatch, argument checks, and per-call timeouts
//! - Translating backend outcomes into `tools/call` results
//!
//! Every per-call failure is answered inline. Only transport failures end
//! the session.

pub mod dispatcher;
pub mod errors;
pub mod registry;
pub mod session;
pub mod tools;
pub mod translator;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use dispatcher::Dispatcher;
pub use errors::{RegistryError, SessionError, ToolError};
pub use registry::{ToolHandler, ToolRegistry};
pub use session::{CloseReason, Session, SessionState, SessionSummary};
pub use types::{ToolCallRequest, ToolCallResult, ToolDescriptor};
