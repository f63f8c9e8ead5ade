//! Connection Manager error types.

use thiserror::Error;

/// Errors raised by the connection subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Endpoint or credential was not configured. Fatal to the connection
    /// subsystem: no attempts are ever made.
    #[error("connection config missing: {field} is not set")]
    ConfigMissing {
        field: &'static str,
    },

    /// A send was attempted while the connection was not open. The message
    /// is dropped.
    #[error("cannot send message, connection is {state}")]
    NotConnected {
        state: String,
    },

    /// Socket-level failure: refused connect, I/O error, or remote close.
    #[error("transport fault: {reason}")]
    TransportFault {
        reason: String,
    },
}

impl ConnectionError {
    /// Shorthand for building a `TransportFault` from any displayable error.
    pub fn fault(reason: impl std::fmt::Display) -> Self {
        ConnectionError::TransportFault {
            reason: reason.to_string(),
        }
    }
}
