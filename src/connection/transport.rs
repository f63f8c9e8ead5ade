//! Transport abstraction for the coordinator link.
//!
//! A [`Connector`] opens a [`Link`]: a sink for outbound text frames and a
//! stream of inbound ones. The Connection Manager never sees the concrete
//! socket type, which keeps the state machine testable against the
//! in-memory transport.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use super::errors::ConnectionError;

/// Outbound half of a link.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;

/// Inbound half of a link. The stream ends when the remote closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// An open, message-oriented connection to the coordinator.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    /// Box a sink/stream pair into a link.
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<String, Error = ConnectionError> + Send + 'static,
        R: Stream<Item = Result<String, ConnectionError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links to a coordinator endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a link to `url`. Failure is always a `TransportFault`.
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError>;
}
