pub mod backend;
pub mod config;
pub mod logging;
pub mod mcp_server;

use std::sync::Arc;

use anyhow::Context;

use backend::{BackendClient, StockBackend};
use config::BridgeConfig;
use mcp_server::{Dispatcher, Session, SessionSummary, ToolRegistry};

/// Build the registry of built-in tools around a backend.
pub fn build_registry(backend: Arc<dyn StockBackend>) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    mcp_server::tools::register_default_tools(&mut registry, backend)
        .context("failed to register built-in tools")?;
    Ok(registry)
}

/// Build the dispatcher for a resolved configuration.
pub fn build_dispatcher(config: &BridgeConfig) -> anyhow::Result<Dispatcher> {
    let client = BackendClient::from_config(&config.backend)
        .context("failed to create backend client")?;
    tracing::info!(endpoint = %client.endpoint(), "backend client ready");

    let registry = build_registry(Arc::new(client))?;
    Ok(Dispatcher::new(Arc::new(registry)).with_call_timeout(config.server.call_timeout_ms))
}

/// Run the bridge on this process's stdin/stdout until the peer closes.
pub async fn run() -> anyhow::Result<SessionSummary> {
    let (config, config_path) = config::resolve_config().context("failed to load config")?;

    logging::init_tracing(&config.logging);
    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "loaded bridge config"),
        None => tracing::info!("no config file found, using defaults"),
    }

    let dispatcher = build_dispatcher(&config)?;

    let mut session = Session::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        dispatcher,
        &config.server.name,
    );
    session.connect().await;

    let summary = session.run().await.context("stdio session failed")?;
    Ok(summary)
}
