//! Backend client: JSON-over-HTTP access to the stock-data service.
//!
//! This module handles:
//! - Encoding `{api_name, params, fields}` request bodies
//! - The single `POST {base_url}/api` round trip per tool call
//! - Decoding `{code, msg, data}` responses
//! - Classifying connection, timeout, status, and decode failures

pub mod client;
pub mod errors;
pub mod types;

pub use client::{BackendClient, StockBackend};
pub use errors::BackendError;
pub use types::{BackendRequest, BackendResponse};
