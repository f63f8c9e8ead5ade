//! Protocol Handler error types.

use thiserror::Error;

use crate::connection::ConnectionError;

/// Errors raised while decoding, routing, or sending protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound frame is not a `{type, data}` JSON envelope. The frame is
    /// discarded; the connection stays open.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        reason: String,
    },

    /// `execute_tool` payload without a usable `requestId` or `toolName`.
    /// No result is sent because there is nothing to address it to.
    #[error("invalid tool execution request: {reason}")]
    InvalidRequest {
        reason: String,
    },

    /// Outbound message could not be serialized.
    #[error("failed to encode message: {reason}")]
    Encode {
        reason: String,
    },

    /// The connection refused the message (usually `NotConnected`).
    #[error(transparent)]
    Send(#[from] ConnectionError),
}
