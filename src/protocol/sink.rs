//! Outbound message seam between protocol logic and the connection.

use super::errors::ProtocolError;
use super::types::OutboundMessage;
use crate::connection::ConnectionManager;

/// Anything that can deliver an outbound message to the coordinator.
///
/// Delivery is fire-and-forget: an error means the message was dropped.
pub trait MessageSink: Send + Sync + 'static {
    fn send_message(&self, message: &OutboundMessage) -> Result<(), ProtocolError>;
}

impl MessageSink for ConnectionManager {
    fn send_message(&self, message: &OutboundMessage) -> Result<(), ProtocolError> {
        let frame = message.to_frame()?;
        self.send(frame)?;
        Ok(())
    }
}
