//! Tool registry: the static name → (descriptor, handler) table.
//!
//! Provides:
//! - Registration with schema validation (run once at startup)
//! - Lookup by tool name
//! - Required-argument checks against the registered schema
//! - Descriptors in registration order for `tools/list`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::{RegistryError, ToolError};
use super::types::{ToolArguments, ToolCallRequest, ToolCallResult, ToolDescriptor};

// ─── ToolHandler ─────────────────────────────────────────────────────────────

/// Executes one tool call.
///
/// Handlers are only invoked after the dispatcher has checked every required
/// argument, so `request.arg(required_name)` is always `Some`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, request: &ToolCallRequest) -> Result<ToolCallResult, ToolError>;
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// A registered tool.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: &'static ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

/// Immutable after startup; shared across calls behind an `Arc`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    /// Registration order, for a stable `tools/list`.
    tools: Vec<RegisteredTool>,
    /// `tool_name → index into tools`.
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool after validating its schema.
    pub fn register(
        &mut self,
        descriptor: &'static ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        validate_descriptor(descriptor)?;

        if self.index.contains_key(descriptor.name) {
            return Err(RegistryError::DuplicateTool {
                name: descriptor.name.to_string(),
            });
        }

        self.index.insert(descriptor.name, self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });

        tracing::debug!(tool = descriptor.name, "registered tool");
        Ok(())
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, ToolError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static ToolDescriptor> + '_ {
        self.tools.iter().map(|t| t.descriptor)
    }

    /// Tool names in registration order.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.descriptor.name).collect()
    }

    /// Serialize all descriptors into `tools/list` entries.
    pub fn to_mcp_tools(&self) -> Vec<serde_json::Value> {
        self.descriptors().map(|d| d.to_mcp_tool()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Check that every required parameter of `descriptor` is present.
///
/// Reports all missing parameters at once, in declaration order.
pub fn check_required(
    descriptor: &ToolDescriptor,
    arguments: &ToolArguments,
) -> Result<(), ToolError> {
    let missing: Vec<String> = descriptor
        .required_params()
        .filter(|name| !arguments.contains_key(*name))
        .map(String::from)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::MissingArguments {
            tool: descriptor.name.to_string(),
            missing,
        })
    }
}

/// Validate a descriptor against the supported schema subset.
fn validate_descriptor(descriptor: &ToolDescriptor) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSchema {
        tool: descriptor.name.to_string(),
        reason,
    };

    if descriptor.name.trim().is_empty() {
        return Err(invalid("tool name must not be empty".into()));
    }
    if descriptor.description.trim().is_empty() {
        return Err(invalid("tool description must not be empty".into()));
    }

    let mut seen = std::collections::HashSet::new();
    for param in descriptor.params {
        if param.name.trim().is_empty() {
            return Err(invalid("parameter name must not be empty".into()));
        }
        if !seen.insert(param.name) {
            return Err(invalid(format!("duplicate parameter '{}'", param.name)));
        }
        if param.description.trim().is_empty() {
            return Err(invalid(format!(
                "parameter '{}' is missing a description",
                param.name
            )));
        }
    }

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
