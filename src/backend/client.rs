//! HTTP client for the stock-data backend.
//!
//! One `POST {base_url}/api` per call. No retry and no fallback: a failed
//! call is reported back to the dispatcher as a [`BackendError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client as HttpClient;

use super::errors::BackendError;
use super::types::{BackendRequest, BackendResponse};
use crate::config::BackendConfig;

/// `Accept` header expected by the backend.
const ACCEPT_VALUE: &str = "application/geo+json";

// ─── StockBackend ────────────────────────────────────────────────────────────

/// Anything that can answer a [`BackendRequest`].
///
/// The HTTP client is the production implementation; tests inject stubs.
#[async_trait]
pub trait StockBackend: Send + Sync {
    async fn query(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError>;
}

// ─── BackendClient ───────────────────────────────────────────────────────────

/// reqwest-backed client with fixed headers and explicit timeouts.
pub struct BackendClient {
    http: HttpClient,
    endpoint: String,
    request_timeout_secs: u64,
}

impl BackendClient {
    /// Build a client from configuration. Does not contact the backend.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let endpoint = api_endpoint(&config.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));

        let mut builder = HttpClient::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs));
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        let http = builder
            .build()
            .map_err(|e| BackendError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            endpoint,
            request_timeout_secs: config.request_timeout_secs,
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StockBackend for BackendClient {
    async fn query(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        tracing::debug!(
            url = %self.endpoint,
            api_name = %request.api_name,
            param_count = request.params.len(),
            "backend request"
        );

        // `.json()` sets `Content-Type: application/json`.
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout {
                        duration_secs: self.request_timeout_secs,
                    }
                } else {
                    BackendError::ConnectionFailed {
                        endpoint: self.endpoint.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BackendError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    duration_secs: self.request_timeout_secs,
                }
            } else {
                BackendError::DecodeError {
                    reason: format!("failed to read response body: {e}"),
                }
            }
        })?;

        serde_json::from_str::<BackendResponse>(&body_text).map_err(|e| BackendError::DecodeError {
            reason: e.to_string(),
        })
    }
}

/// `{base_url}/api`, tolerating a trailing slash on the base URL.
fn api_endpoint(base_url: &str) -> String {
    format!("{}/api", base_url.trim().trim_end_matches('/'))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
