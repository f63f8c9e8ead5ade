//! Protocol Handler: the node's side of the coordinator message protocol.
//!
//! This module handles:
//! - The `{type, data}` JSON envelope and its typed messages
//! - Tool registration each time the connection opens
//! - Routing `execute_tool` requests to the Tool Dispatcher
//! - Discarding malformed frames without touching the connection
//!
//! Unknown message types are ignored so newer coordinators can add messages
//! without breaking older nodes.

pub mod errors;
pub mod handler;
pub mod sink;
pub mod types;

// Re-exports for convenience
pub use errors::ProtocolError;
pub use handler::{FrameOutcome, ProtocolHandler};
pub use sink::MessageSink;
pub use types::{
    Envelope, ExecutionRequest, InboundMessage, OutboundMessage, ToolOutcome, ToolResult,
    EXECUTE_TOOL, REGISTER_TOOLS, TOOL_RESULT,
};
