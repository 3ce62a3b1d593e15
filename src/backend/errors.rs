//! Backend client error types.
//!
//! Every variant here is local to a single tool call. The dispatcher turns
//! them into error-flagged results; none of them ends the session.

use thiserror::Error;

/// Errors that can occur while talking to the stock-data backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// TCP/HTTP connection to the backend failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The backend did not answer within the configured timeout.
    #[error("backend timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body was not a valid `{code, msg, data}` envelope.
    #[error("failed to decode backend response: {reason}")]
    DecodeError {
        reason: String,
    },

    /// The HTTP client could not be built from configuration.
    #[error("backend client config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl BackendError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
