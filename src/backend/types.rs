//! Wire types for the stock-data backend.
//!
//! The backend speaks a tiny JSON envelope: a request naming the upstream
//! API plus its parameters, and a `{code, msg, data}` response where
//! `code == 0` marks success.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── Request ─────────────────────────────────────────────────────────────────

/// Body of `POST {base_url}/api`.
///
/// `params` is a `BTreeMap` so identical calls serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub api_name: String,
    pub params: BTreeMap<String, String>,
    /// Comma-separated column filter. Empty means all columns.
    #[serde(default)]
    pub fields: String,
}

impl BackendRequest {
    /// Create a request with no parameters and no field filter.
    pub fn new(api_name: &str) -> Self {
        Self {
            api_name: api_name.to_string(),
            params: BTreeMap::new(),
            fields: String::new(),
        }
    }

    /// Add a parameter (builder style).
    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the field filter (builder style).
    pub fn fields(mut self, fields: &str) -> Self {
        self.fields = fields.to_string();
        self
    }
}

// ─── Response ────────────────────────────────────────────────────────────────

/// Success sentinel for [`BackendResponse::code`].
pub const SUCCESS_CODE: i64 = 0;

/// Decoded backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: String,
}

impl BackendResponse {
    /// Whether the backend reported success. Only then is `data` meaningful.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
