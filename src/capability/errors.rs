//! Capability Provider error types.

use thiserror::Error;

/// Category of a capability failure, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    UnknownTool,
    SpawnFailed,
    InvocationFailed,
}

/// Errors returned by a capability invocation.
///
/// These are reported back to the coordinator as `status: "error"` results;
/// they never affect the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// No capability is registered under this name.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// The capability's process could not be started.
    #[error("failed to start tool '{tool}': {reason}")]
    SpawnFailed {
        tool: String,
        reason: String,
    },

    /// The capability ran and reported a failure. Displays the bare message,
    /// which may be empty.
    #[error("{message}")]
    InvocationFailed {
        tool: String,
        message: String,
    },
}

impl CapabilityError {
    pub fn kind(&self) -> CapabilityErrorKind {
        match self {
            CapabilityError::UnknownTool { .. } => CapabilityErrorKind::UnknownTool,
            CapabilityError::SpawnFailed { .. } => CapabilityErrorKind::SpawnFailed,
            CapabilityError::InvocationFailed { .. } => CapabilityErrorKind::InvocationFailed,
        }
    }

    /// Convenience constructor for provider implementations.
    pub fn failed(tool: &str, message: impl Into<String>) -> Self {
        CapabilityError::InvocationFailed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}
