//! Protocol Handler: registration on open and routing of inbound frames.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::ProtocolError;
use super::sink::MessageSink;
use super::types::{Envelope, InboundMessage, OutboundMessage, ToolResult};
use crate::capability::ToolManifest;
use crate::connection::ConnectionEvent;
use crate::dispatcher::ToolDispatcher;

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// An `execute_tool` request was handed to the dispatcher. The handle
    /// resolves to the emitted result, if any.
    Dispatched(JoinHandle<Option<ToolResult>>),
    /// Unrecognized message type, ignored.
    Ignored { kind: String },
}

/// Interprets connection events for one node.
pub struct ProtocolHandler {
    server_name: String,
    /// Immutable snapshot taken before the first connect.
    manifests: Arc<[ToolManifest]>,
    sink: Arc<dyn MessageSink>,
    dispatcher: ToolDispatcher,
}

impl ProtocolHandler {
    pub fn new(
        server_name: impl Into<String>,
        manifests: Vec<ToolManifest>,
        sink: Arc<dyn MessageSink>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            manifests: manifests.into(),
            sink,
            dispatcher,
        }
    }

    /// Drain connection events until the connection shuts down.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Opened => {
                    if let Err(e) = self.register_tools() {
                        tracing::error!(error = %e, "failed to send tool registration");
                    }
                }
                ConnectionEvent::Frame(frame) => match self.handle_frame(&frame) {
                    Ok(FrameOutcome::Dispatched(_)) => {}
                    Ok(FrameOutcome::Ignored { kind }) => {
                        tracing::debug!(kind = %kind, "ignoring unrecognized message type");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "error parsing message from main server");
                    }
                },
            }
        }
        tracing::debug!(server = %self.server_name, "protocol handler stopped");
    }

    /// Advertise the manifest snapshot. Sends nothing when the snapshot is
    /// empty. Returns the number of tools registered.
    pub fn register_tools(&self) -> Result<usize, ProtocolError> {
        if self.manifests.is_empty() {
            tracing::debug!(server = %self.server_name, "no local tools found to register");
            return Ok(0);
        }

        let message = OutboundMessage::RegisterTools {
            server_name: self.server_name.clone(),
            tools: self.manifests.to_vec(),
        };
        self.sink.send_message(&message)?;

        tracing::info!(
            server = %self.server_name,
            count = self.manifests.len(),
            "sent tool registration to main server"
        );
        Ok(self.manifests.len())
    }

    /// Decode one inbound frame and route it.
    ///
    /// A malformed frame is an error for the caller to log; the connection
    /// is left alone. Tool execution runs on its own task.
    pub fn handle_frame(&self, frame: &str) -> Result<FrameOutcome, ProtocolError> {
        let envelope = Envelope::parse(frame)?;
        tracing::debug!(kind = %envelope.kind, "received message from main server");

        match InboundMessage::from(envelope) {
            InboundMessage::ExecuteTool(data) => {
                let dispatcher = self.dispatcher.clone();
                let handle = tokio::spawn(async move { dispatcher.handle(data).await });
                Ok(FrameOutcome::Dispatched(handle))
            }
            InboundMessage::Unknown(kind) => Ok(FrameOutcome::Ignored { kind }),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::capability::{CapabilityError, CapabilityOutput, CapabilityProvider};
    use crate::protocol::sink::testing::RecordingSink;

    struct FixedProvider {
        manifests: Vec<ToolManifest>,
    }

    #[async_trait]
    impl CapabilityProvider for FixedProvider {
        fn list_manifests(&self) -> Vec<ToolManifest> {
            self.manifests.clone()
        }

        async fn invoke(
            &self,
            name: &str,
            _arguments: Value,
        ) -> Result<CapabilityOutput, CapabilityError> {
            Ok(CapabilityOutput::Text(format!("ran {name}")))
        }
    }

    fn handler(tool_names: &[&str], sink: Arc<RecordingSink>) -> ProtocolHandler {
        let manifests: Vec<ToolManifest> =
            tool_names.iter().map(|n| ToolManifest::named(*n)).collect();
        let provider = Arc::new(FixedProvider {
            manifests: manifests.clone(),
        });
        let dispatcher = ToolDispatcher::new(provider, sink.clone());
        ProtocolHandler::new("node-a", manifests, sink, dispatcher)
    }

    #[test]
    fn test_register_three_tools() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&["a", "b", "c"], sink.clone());

        assert_eq!(handler.register_tools().unwrap(), 3);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            OutboundMessage::RegisterTools { server_name, tools } => {
                assert_eq!(server_name, "node-a");
                assert_eq!(tools.len(), 3);
                assert_eq!(tools[2].name, "c");
            }
            other => panic!("expected register_tools, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_snapshot_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&[], sink.clone());

        assert_eq!(handler.register_tools().unwrap(), 0);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_registration_send_failure_is_reported() {
        let sink = Arc::new(RecordingSink::refusing());
        let handler = handler(&["a"], sink);
        assert!(matches!(
            handler.register_tools(),
            Err(ProtocolError::Send(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&["a"], sink.clone());

        let result = handler.handle_frame("{not json");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&["a"], sink.clone());

        let outcome = handler
            .handle_frame(r#"{"type":"server_announcement","data":{"v":2}}"#)
            .unwrap();
        assert!(matches!(outcome, FrameOutcome::Ignored { kind } if kind == "server_announcement"));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_execute_tool_is_dispatched() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&["a"], sink.clone());

        let frame = json!({
            "type": "execute_tool",
            "data": {"requestId": "req-1", "toolName": "a", "toolArgs": {}}
        })
        .to_string();

        let FrameOutcome::Dispatched(handle) = handler.handle_frame(&frame).unwrap() else {
            panic!("expected dispatch");
        };
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, ToolResult::success("req-1", json!({"originalOutput": "ran a"})));
        assert_eq!(sink.sent(), vec![OutboundMessage::ToolResult(result)]);
    }

    #[tokio::test]
    async fn test_run_registers_on_each_open() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&["a", "b"], sink.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ConnectionEvent::Opened).unwrap();
        tx.send(ConnectionEvent::Frame("garbage".into())).unwrap();
        tx.send(ConnectionEvent::Opened).unwrap();
        drop(tx);

        handler.run(rx).await;

        let registrations = sink
            .sent()
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::RegisterTools { .. }))
            .count();
        assert_eq!(registrations, 2);
    }
}
