//! Bridge configuration loading.
//!
//! Reads an optional YAML file and resolves environment variables. Every
//! field has a default, so the bridge runs with no config file at all and
//! talks to a backend on `http://127.0.0.1:8000`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Env var pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "STOCK_MCP_CONFIG";

/// Env var overriding `backend.base_url`.
pub const BASE_URL_ENV: &str = "STOCK_MCP_BASE_URL";

/// File name searched for upward from the working directory.
const CONFIG_FILE_NAME: &str = "stock-mcp.yaml";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `stock-mcp.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity advertised in `initialize` plus dispatcher limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Upper bound on a single tool call, including the backend round trip.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

/// Stock-data backend endpoint and HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY`. Off by default: the backend is
    /// usually on the local network.
    #[serde(default)]
    pub use_system_proxy: bool,
}

/// Log output settings. Logs never go to stdout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
    /// Write logs to this file (rotated on startup) instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_server_name() -> String {
    "stock-analyzer".to_string()
}
fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_user_agent() -> String {
    "TushareApiClient/1.0".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            use_system_proxy: false,
        }
    }
}

impl BridgeConfig {
    /// Reject values that would make the bridge unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                reason: format!("backend.base_url must be an http(s) URL, got '{url}'"),
            });
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "backend.request_timeout_secs must be greater than zero".into(),
            });
        }
        if self.server.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.call_timeout_ms must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Apply environment overrides on top of file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url.trim().to_string();
            }
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate a config file.
///
/// Resolution order:
/// 1. `STOCK_MCP_CONFIG` env var. A path that does not exist is an error.
/// 2. `stock-mcp.yaml` in `start` or any parent directory.
/// 3. `<config_dir>/stock-mcp-bridge/config.yaml`.
///
/// Returns `Ok(None)` when nothing is found; defaults apply.
pub fn find_config_path(start: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let explicit = std::env::var(CONFIG_PATH_ENV).ok();
    locate_config(explicit.as_deref(), start)
}

fn locate_config(explicit: Option<&str>, start: &Path) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
        let candidate = PathBuf::from(expand_tilde(path.trim()));
        if !candidate.is_file() {
            return Err(ConfigError::ReadFailed {
                path: candidate.display().to_string(),
                reason: format!("{CONFIG_PATH_ENV} points to a missing file"),
            });
        }
        return Ok(Some(candidate));
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(Some(candidate));
        }
        if !dir.pop() {
            break;
        }
    }

    Ok(dirs::config_dir()
        .map(|d| d.join("stock-mcp-bridge").join("config.yaml"))
        .filter(|p| p.exists()))
}

/// Load and parse a configuration file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing, then applies env overrides.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut config = parse_config(&raw)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Resolve the effective configuration for this process.
///
/// Returns the config together with the file it came from, if any.
pub fn resolve_config() -> Result<(BridgeConfig, Option<PathBuf>), ConfigError> {
    let cwd = std::env::current_dir().unwrap_or_default();
    match find_config_path(&cwd)? {
        Some(path) => {
            let config = load_config(&path)?;
            Ok((config, Some(path)))
        }
        None => {
            let mut config = BridgeConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok((config, None))
        }
    }
}

fn parse_config(raw: &str) -> Result<BridgeConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseFailed {
        reason: e.to_string(),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
