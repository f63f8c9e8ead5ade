//! Wire messages exchanged with the coordinator.
//!
//! Every frame is a JSON text envelope `{"type": ..., "data": ...}`:
//!
//! | Direction | `type`           | `data`                                          |
//! |-----------|------------------|-------------------------------------------------|
//! | out       | `register_tools` | `{serverName, tools: [manifest...]}`            |
//! | in        | `execute_tool`   | `{requestId, toolName, toolArgs}`               |
//! | out       | `tool_result`    | `{requestId, status: "success", result}`        |
//! | out       | `tool_result`    | `{requestId, status: "error", error}`           |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ProtocolError;
use crate::capability::ToolManifest;

// ─── Message Types ───────────────────────────────────────────────────────────

pub const REGISTER_TOOLS: &str = "register_tools";
pub const EXECUTE_TOOL: &str = "execute_tool";
pub const TOOL_RESULT: &str = "tool_result";

// ─── Inbound ─────────────────────────────────────────────────────────────────

/// Untyped inbound envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse a raw text frame.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedFrame {
            reason: e.to_string(),
        })
    }
}

/// Inbound messages this node understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    ExecuteTool(Value),
    /// Any other type. Ignored for forward compatibility.
    Unknown(String),
}

impl From<Envelope> for InboundMessage {
    fn from(envelope: Envelope) -> Self {
        if envelope.kind == EXECUTE_TOOL {
            InboundMessage::ExecuteTool(envelope.data)
        } else {
            InboundMessage::Unknown(envelope.kind)
        }
    }
}

/// A structurally valid tool execution request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub request_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExecutionRequest {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_args: Value,
}

impl ExecutionRequest {
    /// Validate the `data` of an `execute_tool` message.
    ///
    /// `requestId` and `toolName` must be present, non-empty strings.
    pub fn from_data(data: Value) -> Result<Self, ProtocolError> {
        let raw: RawExecutionRequest =
            serde_json::from_value(data).map_err(|e| ProtocolError::InvalidRequest {
                reason: e.to_string(),
            })?;

        let request_id = raw
            .request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProtocolError::InvalidRequest {
                reason: "missing requestId".into(),
            })?;
        let tool_name = raw
            .tool_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProtocolError::InvalidRequest {
                reason: format!("missing toolName (requestId {request_id})"),
            })?;

        Ok(Self {
            request_id,
            tool_name,
            arguments: raw.tool_args,
        })
    }
}

// ─── Outbound ────────────────────────────────────────────────────────────────

/// Outcome half of a `tool_result`, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success { result: Value },
    Error { error: String },
}

/// Result for exactly one execution request, correlated by `requestId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(request_id: impl Into<String>, result: Value) -> Self {
        Self {
            request_id: request_id.into(),
            outcome: ToolOutcome::Success { result },
        }
    }

    pub fn error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            outcome: ToolOutcome::Error {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }
}

/// Messages this node sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    RegisterTools {
        #[serde(rename = "serverName")]
        server_name: String,
        tools: Vec<ToolManifest>,
    },
    ToolResult(ToolResult),
}

impl OutboundMessage {
    /// Wire name of this message's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::RegisterTools { .. } => REGISTER_TOOLS,
            OutboundMessage::ToolResult(_) => TOOL_RESULT,
        }
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode {
            reason: e.to_string(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
