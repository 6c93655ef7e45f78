//! WebSocket event source.
//!
//! Connects to the chat backend's real-time stream and decodes one
//! [`StreamEvent`] per JSON text frame. Ping/pong and binary frames are
//! transport noise and skipped; a malformed text frame surfaces as a
//! recoverable [`StreamError::Decode`] so one bad event never ends the
//! stream.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use clubchat_proto::codec;
use clubchat_proto::event::StreamEvent;

use super::{EventSource, StreamError};

/// Type alias for the underlying WebSocket connection.
type WsConnection = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Default timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket-backed [`EventSource`].
pub struct WsSource {
    ws: WsConnection,
}

impl WsSource {
    /// Connect to the backend's event stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the URL is invalid, the
    /// connection fails, or the connect timeout expires.
    pub async fn connect(stream_url: &str) -> Result<Self, StreamError> {
        let url = Url::parse(stream_url)
            .map_err(|e| StreamError::Transport(format!("invalid stream url: {e}")))?;

        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| StreamError::Transport("connect timeout".into()))?
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        tracing::info!(url = %url, "connected to event stream");
        Ok(Self { ws })
    }
}

impl EventSource for WsSource {
    async fn next_event(&mut self) -> Result<StreamEvent, StreamError> {
        loop {
            match self.ws.next().await {
                None => return Err(StreamError::Closed),
                Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
                Some(Ok(Message::Text(frame))) => {
                    return Ok(codec::decode_frame(frame.as_str())?);
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("event stream sent close frame");
                    return Err(StreamError::Closed);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {
                    // Keepalive / non-protocol traffic.
                }
                Some(Ok(Message::Frame(_))) => {
                    tracing::debug!("ignoring raw frame from stream");
                }
            }
        }
    }
}
