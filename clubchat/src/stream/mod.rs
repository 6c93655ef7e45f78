//! Real-time event stream abstraction.
//!
//! The engine never talks to a socket API directly; it consumes
//! [`StreamEvent`]s from anything implementing [`EventSource`]. Concrete
//! implementations include:
//! - [`ws::WsSource`] — WebSocket connection to the chat backend
//! - [`loopback::LoopbackSource`] — in-process channel for testing

pub mod loopback;
pub mod ws;

use std::sync::Arc;

use tokio::task::JoinHandle;

use clubchat_proto::codec::CodecError;
use clubchat_proto::event::StreamEvent;

use crate::api::ChatApi;
use crate::storage::LocalStore;
use crate::sync::ChatSession;

/// Errors that can occur while reading the event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream has ended; no more events will arrive.
    #[error("event stream closed")]
    Closed,

    /// A frame arrived but could not be decoded. Recoverable: the caller
    /// should drop the frame and keep reading.
    #[error("malformed frame: {0}")]
    Decode(#[from] CodecError),

    /// Transport-level failure.
    #[error("stream transport error: {0}")]
    Transport(String),
}

/// Async source of stream events.
pub trait EventSource: Send {
    /// Wait for the next event.
    ///
    /// Returns [`StreamError::Closed`] once the stream has ended, or
    /// [`StreamError::Decode`] for a single bad frame (keep calling).
    fn next_event(
        &mut self,
    ) -> impl std::future::Future<Output = Result<StreamEvent, StreamError>> + Send;
}

/// Spawn a task forwarding a source's events into a session.
///
/// Malformed frames are logged and skipped; the task exits when the
/// stream closes or fails at the transport level.
pub fn spawn_pump<S, A, Q>(mut source: S, session: Arc<ChatSession<A, Q>>) -> JoinHandle<()>
where
    S: EventSource + 'static,
    A: ChatApi + 'static,
    Q: LocalStore + 'static,
{
    tokio::spawn(async move {
        loop {
            match source.next_event().await {
                Ok(event) => session.handle_event(event).await,
                Err(StreamError::Decode(e)) => {
                    tracing::warn!(error = %e, "dropping malformed stream frame");
                }
                Err(StreamError::Closed) => {
                    tracing::info!("event stream closed");
                    break;
                }
                Err(StreamError::Transport(e)) => {
                    tracing::warn!(error = %e, "event stream transport failure");
                    break;
                }
            }
        }
    })
}
