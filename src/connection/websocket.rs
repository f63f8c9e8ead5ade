//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! Text frames pass through untouched. Binary frames are decoded as UTF-8.
//! Ping/pong and close frames are answered by tungstenite itself and never
//! reach the Protocol Handler.

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::errors::ConnectionError;
use super::transport::{Connector, Link};

/// Connects to the coordinator over `ws://` or `wss://`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(ConnectionError::fault)?;

        let (sink, stream) = socket.split();

        let sink = sink
            .with(|frame: String| future::ready(Ok::<Message, WsError>(Message::text(frame))))
            .sink_map_err(ConnectionError::fault);

        let stream = stream.filter_map(|message| future::ready(decode_message(message)));

        Ok(Link::new(sink, stream))
    }
}

/// Map one tungstenite message to an inbound frame, dropping control frames.
fn decode_message(
    message: Result<Message, WsError>,
) -> Option<Result<String, ConnectionError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        // The stream ends right after a close frame.
        Ok(Message::Close(_)) => None,
        Err(e) => Some(Err(ConnectionError::fault(e))),
    }
}
