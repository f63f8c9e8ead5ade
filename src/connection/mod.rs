//! Connection Manager: the node's single outbound link to the coordinator.
//!
//! This module handles:
//! - The connection state machine (Disconnected → Connecting → Open, Closed)
//! - Reconnection with exponential backoff (5s doubling to a 60s ceiling)
//! - Fire-and-forget sends that fail fast while the link is down
//! - Transports: WebSocket for production, scripted in-memory for tests
//!
//! Inbound frames leave this module as [`ConnectionEvent`]s on a channel that
//! the Protocol Handler drains.

pub mod backoff;
pub mod errors;
pub mod manager;
pub mod memory;
pub mod transport;
pub mod websocket;

// Re-exports for convenience
pub use backoff::{Backoff, MAX_BACKOFF, MIN_BACKOFF};
pub use errors::ConnectionError;
pub use manager::{ConnectionEvent, ConnectionManager, ConnectionSettings, ConnectionState};
pub use memory::{ConnectAttempt, MemoryConnector, MemoryPeer, ScriptedAttempt};
pub use transport::{Connector, Link};
pub use websocket::WebSocketConnector;
