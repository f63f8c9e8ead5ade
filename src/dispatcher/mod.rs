//! Tool Dispatcher: turns `execute_tool` requests into `tool_result`s.
//!
//! For every structurally valid request exactly one result is produced and
//! handed to the outbound sink. Requests are independent: there is no
//! request table and no lock, so concurrent dispatches may finish (and be
//! sent) in any order. Correlation is carried only by `requestId`.

pub mod normalize;

use std::sync::Arc;

use serde_json::Value;

use crate::capability::CapabilityProvider;
use crate::protocol::sink::MessageSink;
use crate::protocol::types::{ExecutionRequest, OutboundMessage, ToolResult};

pub use normalize::{error_message, normalize_output, ORIGINAL_OUTPUT_KEY, UNKNOWN_ERROR_MESSAGE};

/// Executes tool requests against the capability provider.
#[derive(Clone)]
pub struct ToolDispatcher {
    provider: Arc<dyn CapabilityProvider>,
    sink: Arc<dyn MessageSink>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher").finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    pub fn new(provider: Arc<dyn CapabilityProvider>, sink: Arc<dyn MessageSink>) -> Self {
        Self { provider, sink }
    }

    /// Handle the `data` of one `execute_tool` message.
    ///
    /// Returns the result that was emitted, or `None` when the request had
    /// no usable `requestId`/`toolName` (logged, nothing sent).
    pub async fn handle(&self, data: Value) -> Option<ToolResult> {
        let request = match ExecutionRequest::from_data(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "invalid tool execution request received");
                return None;
            }
        };

        let result = self.execute(request).await;
        self.deliver(&result);
        Some(result)
    }

    /// Invoke the capability and normalize its outcome. Never fails: a
    /// provider error becomes a `status: "error"` result.
    pub async fn execute(&self, request: ExecutionRequest) -> ToolResult {
        let ExecutionRequest {
            request_id,
            tool_name,
            arguments,
        } = request;

        tracing::debug!(
            tool = %tool_name,
            request_id = %request_id,
            "executing tool"
        );

        match self.provider.invoke(&tool_name, arguments).await {
            Ok(output) => ToolResult::success(request_id, normalize_output(output)),
            Err(e) => {
                let message = error_message(&e);
                tracing::error!(
                    tool = %tool_name,
                    request_id = %request_id,
                    kind = ?e.kind(),
                    error = %message,
                    "error executing tool"
                );
                ToolResult::error(request_id, message)
            }
        }
    }

    /// Send a result. If the link is down the result is dropped.
    fn deliver(&self, result: &ToolResult) {
        let request_id = result.request_id.clone();
        let message = OutboundMessage::ToolResult(result.clone());

        match self.sink.send_message(&message) {
            Ok(()) => {
                tracing::debug!(request_id = %request_id, "sent result");
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    error = %e,
                    "dropping tool result"
                );
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
