use std::sync::Arc;

use anyhow::Context;

use vcp_node::capability::PluginDirectoryProvider;
use vcp_node::config::load_node_config;
use vcp_node::connection::{ConnectionError, WebSocketConnector};
use vcp_node::{DistributedNode, NodeError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config = load_node_config(&cwd)?;

    let log_path =
        vcp_node::init_tracing(&config.log, config.debug_mode).context("failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server_name,
        pid = std::process::id(),
        log_file = ?log_path.as_ref().map(|p| p.display().to_string()),
        debug = config.debug_mode,
        "=== VCP node starting ==="
    );

    let provider = Arc::new(PluginDirectoryProvider::discover(&config.plugin_dir));
    let mut node = DistributedNode::new(config, provider, Arc::new(WebSocketConnector));

    match node.start().await {
        Ok(()) => {}
        Err(NodeError::Connection(ConnectionError::ConfigMissing { field })) => {
            tracing::error!(
                field,
                "Main_Server_URL or VCP_Key is not configured; node stays idle"
            );
        }
        Err(e) => return Err(e.into()),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    node.shutdown().await;
    Ok(())
}
