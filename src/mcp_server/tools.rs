//! Built-in tools: `get_current_date` and `query_stock_data`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{BackendRequest, StockBackend};

use super::errors::{RegistryError, ToolError};
use super::registry::{ToolHandler, ToolRegistry};
use super::translator;
use super::types::{ParamSpec, ParamType, ToolCallRequest, ToolCallResult, ToolDescriptor};

/// `api_name` used when the caller omits it.
pub const DEFAULT_API_NAME: &str = "daily";

// ─── Descriptors ─────────────────────────────────────────────────────────────

pub static CURRENT_DATE_TOOL: ToolDescriptor = ToolDescriptor {
    name: "get_current_date",
    description: "Get today's date in 'yyyy-MM-dd' format",
    params: &[],
};

pub static QUERY_STOCK_DATA_TOOL: ToolDescriptor = ToolDescriptor {
    name: "query_stock_data",
    description: "Query daily K-line (candlestick) data for a stock code over a date range",
    params: &[
        ParamSpec {
            name: "api_name",
            kind: ParamType::String,
            description: "API name, e.g. 'daily' (default)",
            required: false,
        },
        ParamSpec {
            name: "ts_code",
            kind: ParamType::String,
            description: "Stock code, e.g. '000001.SZ'",
            required: true,
        },
        ParamSpec {
            name: "start_date",
            kind: ParamType::String,
            description: "Start date in yyyyMMdd format, e.g. '20250401'",
            required: true,
        },
        ParamSpec {
            name: "end_date",
            kind: ParamType::String,
            description: "End date in yyyyMMdd format, e.g. '20250421'",
            required: true,
        },
        ParamSpec {
            name: "fields",
            kind: ParamType::String,
            description: "Comma-separated list of fields to return. Optional",
            required: false,
        },
    ],
};

/// Register every built-in tool.
pub fn register_default_tools(
    registry: &mut ToolRegistry,
    backend: Arc<dyn StockBackend>,
) -> Result<(), RegistryError> {
    registry.register(&CURRENT_DATE_TOOL, Arc::new(CurrentDateTool))?;
    registry.register(&QUERY_STOCK_DATA_TOOL, Arc::new(QueryStockDataTool::new(backend)))?;
    Ok(())
}

// ─── get_current_date ────────────────────────────────────────────────────────

/// Reports the process-local calendar date.
pub struct CurrentDateTool;

#[async_trait]
impl ToolHandler for CurrentDateTool {
    async fn call(&self, _request: &ToolCallRequest) -> Result<ToolCallResult, ToolError> {
        let today = chrono::Local::now().date_naive();
        Ok(ToolCallResult::text(format!(
            "Today's date is {}",
            today.format("%Y-%m-%d")
        )))
    }
}

// ─── query_stock_data ────────────────────────────────────────────────────────

/// Forwards one query to the stock-data backend.
pub struct QueryStockDataTool {
    backend: Arc<dyn StockBackend>,
}

impl QueryStockDataTool {
    pub fn new(backend: Arc<dyn StockBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend request from validated arguments.
    fn build_request(request: &ToolCallRequest) -> Result<BackendRequest, ToolError> {
        let ts_code = required_arg(request, "ts_code")?;
        let start_date = required_arg(request, "start_date")?;
        let end_date = required_arg(request, "end_date")?;

        Ok(BackendRequest::new(request.arg("api_name").unwrap_or(DEFAULT_API_NAME))
            .param("ts_code", ts_code)
            .param("start_date", start_date)
            .param("end_date", end_date)
            .fields(request.arg("fields").unwrap_or_default()))
    }
}

fn required_arg<'a>(request: &'a ToolCallRequest, name: &str) -> Result<&'a str, ToolError> {
    request.arg(name).ok_or_else(|| ToolError::MissingArguments {
        tool: request.name.clone(),
        missing: vec![name.to_string()],
    })
}

#[async_trait]
impl ToolHandler for QueryStockDataTool {
    async fn call(&self, request: &ToolCallRequest) -> Result<ToolCallResult, ToolError> {
        let backend_request = Self::build_request(request)?;
        let response = self
            .backend
            .query(&backend_request)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    api_name = %backend_request.api_name,
                    status = ?e.status(),
                    error = %e,
                    "stock API request failed"
                );
            })?;

        if !response.is_success() {
            tracing::warn!(
                api_name = %backend_request.api_name,
                code = response.code,
                msg = %response.msg,
                "stock API reported failure"
            );
        }

        Ok(translator::from_backend_response(response))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
