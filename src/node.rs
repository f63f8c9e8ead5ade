//! The distributed node: one explicit instance owning the connection, the
//! protocol loop and the dispatcher.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::capability::CapabilityProvider;
use crate::config::NodeConfig;
use crate::connection::{ConnectionError, ConnectionManager, ConnectionState, Connector};
use crate::dispatcher::ToolDispatcher;
use crate::protocol::ProtocolHandler;

/// Errors from node startup.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Endpoint or credential missing. The node stays idle.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("node is already running")]
    AlreadyStarted,
}

struct Running {
    connection: ConnectionManager,
    protocol: JoinHandle<()>,
}

/// A tool-serving node attached to one coordinator.
pub struct DistributedNode {
    config: NodeConfig,
    provider: Arc<dyn CapabilityProvider>,
    connector: Arc<dyn Connector>,
    running: Option<Running>,
}

impl DistributedNode {
    pub fn new(
        config: NodeConfig,
        provider: Arc<dyn CapabilityProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            provider,
            connector,
            running: None,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Snapshot the manifests, start the protocol loop and begin connecting.
    ///
    /// Fails with `ConfigMissing` (wrapped) when endpoint or credential is
    /// absent; in that case no connection attempt is ever made.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.running.is_some() {
            return Err(NodeError::AlreadyStarted);
        }

        let settings = self.config.connection_settings()?;
        let manifests = self.provider.list_manifests();

        tracing::info!(
            server = %self.config.server_name,
            tools = manifests.len(),
            base_url = %settings.base_url(),
            "initializing distributed node"
        );

        let (connection, events) = ConnectionManager::new(settings, Arc::clone(&self.connector));
        let sink = Arc::new(connection.clone());
        let dispatcher = ToolDispatcher::new(Arc::clone(&self.provider), sink.clone());
        let handler = ProtocolHandler::new(self.config.server_name.clone(), manifests, sink, dispatcher);

        let protocol = tokio::spawn(handler.run(events));
        connection.connect();

        self.running = Some(Running {
            connection,
            protocol,
        });
        Ok(())
    }

    /// Connection state, or `None` when the node never started.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.running.as_ref().map(|r| r.connection.state())
    }

    /// Close the connection permanently and stop the protocol loop.
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.connection.shutdown().await;
        if let Err(e) = running.protocol.await {
            tracing::warn!(error = %e, "protocol loop ended abnormally");
        }
        tracing::info!(server = %self.config.server_name, "node stopped");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::capability::{CapabilityError, CapabilityOutput, ToolManifest};
    use crate::connection::{ConnectAttempt, MemoryConnector, MemoryPeer, ScriptedAttempt};

    struct EchoProvider {
        tools: usize,
    }

    #[async_trait]
    impl CapabilityProvider for EchoProvider {
        fn list_manifests(&self) -> Vec<ToolManifest> {
            (0..self.tools)
                .map(|i| ToolManifest::named(format!("tool{i}")))
                .collect()
        }

        async fn invoke(
            &self,
            name: &str,
            arguments: Value,
        ) -> Result<CapabilityOutput, CapabilityError> {
            match name {
                "echo" => Ok(CapabilityOutput::Text(
                    arguments["text"].as_str().unwrap_or_default().to_string(),
                )),
                _ => Err(CapabilityError::failed(name, "capability not found")),
            }
        }
    }

    fn config() -> NodeConfig {
        NodeConfig {
            main_server_url: Some("ws://coordinator".into()),
            vcp_key: Some("k".into()),
            server_name: "test-node".into(),
            ..NodeConfig::default()
        }
    }

    fn node(
        tools: usize,
        script: Vec<ScriptedAttempt>,
    ) -> (DistributedNode, mpsc::UnboundedReceiver<ConnectAttempt>) {
        let (connector, attempts) = MemoryConnector::new(script);
        let node = DistributedNode::new(
            config(),
            Arc::new(EchoProvider { tools }),
            Arc::new(connector),
        );
        (node, attempts)
    }

    async fn accepted_peer(attempts: &mut mpsc::UnboundedReceiver<ConnectAttempt>) -> MemoryPeer {
        attempts.recv().await.unwrap().peer.unwrap()
    }

    async fn next_json(peer: &mut MemoryPeer) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), peer.next_frame())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_registers_manifest_snapshot_on_open() {
        let (mut node, mut attempts) = node(3, vec![ScriptedAttempt::Accept]);
        node.start().await.unwrap();

        let mut peer = accepted_peer(&mut attempts).await;
        let registration = next_json(&mut peer).await;
        assert_eq!(registration["type"], "register_tools");
        assert_eq!(registration["data"]["serverName"], "test-node");
        assert_eq!(registration["data"]["tools"].as_array().unwrap().len(), 3);

        node.shutdown().await;
        assert_eq!(node.connection_state(), None);
    }

    #[tokio::test]
    async fn test_round_trip_execution() {
        let (mut node, mut attempts) = node(1, vec![ScriptedAttempt::Accept]);
        node.start().await.unwrap();
        let mut peer = accepted_peer(&mut attempts).await;
        next_json(&mut peer).await; // registration

        peer.send_frame(
            json!({
                "type": "execute_tool",
                "data": {"requestId": "abc123", "toolName": "echo", "toolArgs": {"text": "hello"}}
            })
            .to_string(),
        );

        let result = next_json(&mut peer).await;
        assert_eq!(
            result,
            json!({
                "type": "tool_result",
                "data": {"requestId": "abc123", "status": "success", "result": {"originalOutput": "hello"}}
            })
        );

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let (mut node, mut attempts) = node(0, vec![ScriptedAttempt::Accept]);
        node.start().await.unwrap();
        let mut peer = accepted_peer(&mut attempts).await;

        peer.send_frame("this is not json");
        peer.send_frame(json!({"type": "execute_tool", "data": {"requestId": "r1"}}).to_string());
        peer.send_frame(
            json!({"type": "execute_tool", "data": {"requestId": "r2", "toolName": "nope"}})
                .to_string(),
        );

        // Empty snapshot: no registration; r1 malformed: no result.
        let result = next_json(&mut peer).await;
        assert_eq!(
            result["data"],
            json!({"requestId": "r2", "status": "error", "error": "capability not found"})
        );
        assert_eq!(node.connection_state(), Some(ConnectionState::Open));
        assert!(peer.try_next_frame().is_none());

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_config_never_connects() {
        let (connector, mut attempts) = MemoryConnector::new(vec![ScriptedAttempt::Accept]);
        let mut node = DistributedNode::new(
            NodeConfig::default(),
            Arc::new(EchoProvider { tools: 1 }),
            Arc::new(connector),
        );

        let err = node.start().await.unwrap_err();
        assert!(matches!(
            err,
            NodeError::Connection(ConnectionError::ConfigMissing { .. })
        ));
        assert_eq!(node.connection_state(), None);
        tokio::task::yield_now().await;
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (mut node, _attempts) = node(1, vec![]);
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));
        node.shutdown().await;
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregisters_after_reconnect() {
        use ScriptedAttempt::{Accept, Refuse};
        let (mut node, mut attempts) = node(2, vec![Refuse, Accept, Accept]);
        node.start().await.unwrap();

        let refused = attempts.recv().await.unwrap();
        assert!(refused.peer.is_none());

        let first = attempts.recv().await.unwrap();
        assert_eq!(first.at - refused.at, Duration::from_millis(5_000));
        let mut peer = first.peer.unwrap();
        assert_eq!(next_json(&mut peer).await["type"], "register_tools");
        drop(peer);

        let second = attempts.recv().await.unwrap();
        // Backoff was reset by the successful open.
        assert_eq!(second.at - first.at, Duration::from_millis(5_000));
        let mut peer = second.peer.unwrap();
        assert_eq!(next_json(&mut peer).await["type"], "register_tools");
        assert!(peer.try_next_frame().is_none());

        node.shutdown().await;
    }
}
