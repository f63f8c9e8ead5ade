//! In-process transport for tests and local tooling.
//!
//! A [`MemoryConnector`] follows a script: each connection attempt pops the
//! next [`ScriptedAttempt`] and either refuses or accepts. Every attempt is
//! reported on a channel together with the instant it happened, and
//! accepted attempts carry the coordinator side of the link as a
//! [`MemoryPeer`].

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::errors::ConnectionError;
use super::transport::{Connector, Link};

/// Outcome of one scripted connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAttempt {
    Refuse,
    Accept,
}

/// Record of a connection attempt made against a [`MemoryConnector`].
#[derive(Debug)]
pub struct ConnectAttempt {
    pub url: String,
    pub at: Instant,
    /// Coordinator side of the link, present when the attempt was accepted.
    pub peer: Option<MemoryPeer>,
}

/// Coordinator end of an in-memory link.
///
/// Dropping the peer closes the link from the coordinator side.
#[derive(Debug)]
pub struct MemoryPeer {
    to_node: fmpsc::UnboundedSender<Result<String, ConnectionError>>,
    from_node: fmpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Deliver a text frame to the node.
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.to_node.unbounded_send(Ok(frame.into())).is_ok()
    }

    /// Inject a socket-level error into the node's inbound stream.
    pub fn fail(&self, reason: &str) -> bool {
        self.to_node
            .unbounded_send(Err(ConnectionError::fault(reason)))
            .is_ok()
    }

    /// Next frame the node sent, or `None` once the node closed the link.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_node.next().await
    }

    /// Frame already queued by the node, without waiting.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.from_node.try_next().ok().flatten()
    }
}

/// Scripted connector. Attempts beyond the end of the script are refused.
#[derive(Debug)]
pub struct MemoryConnector {
    script: Mutex<VecDeque<ScriptedAttempt>>,
    attempts: mpsc::UnboundedSender<ConnectAttempt>,
}

impl MemoryConnector {
    /// Create a connector and the receiver that observes its attempts.
    pub fn new(
        script: impl IntoIterator<Item = ScriptedAttempt>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectAttempt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Mutex::new(script.into_iter().collect()),
                attempts: tx,
            },
            rx,
        )
    }

    /// Append further outcomes to the script.
    pub fn push(&self, attempt: ScriptedAttempt) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(attempt);
        }
    }

    fn next_outcome(&self) -> ScriptedAttempt {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(ScriptedAttempt::Refuse)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError> {
        let at = Instant::now();

        match self.next_outcome() {
            ScriptedAttempt::Refuse => {
                let _ = self.attempts.send(ConnectAttempt {
                    url: url.to_string(),
                    at,
                    peer: None,
                });
                Err(ConnectionError::fault("connection refused (scripted)"))
            }
            ScriptedAttempt::Accept => {
                let (node_tx, peer_rx) = fmpsc::unbounded::<String>();
                let (peer_tx, node_rx) = fmpsc::unbounded::<Result<String, ConnectionError>>();

                let _ = self.attempts.send(ConnectAttempt {
                    url: url.to_string(),
                    at,
                    peer: Some(MemoryPeer {
                        to_node: peer_tx,
                        from_node: peer_rx,
                    }),
                });

                let sink = node_tx.sink_map_err(ConnectionError::fault);
                Ok(Link::new(sink, node_rx))
            }
        }
    }
}
