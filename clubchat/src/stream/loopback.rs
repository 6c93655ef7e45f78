//! Loopback event source for testing.
//!
//! Uses an in-process [`tokio::sync::mpsc`] channel to stand in for the
//! backend socket. Created via [`channel`], which returns a handle for
//! the test to emit events and a source for the engine to consume.

use tokio::sync::mpsc;

use clubchat_proto::event::StreamEvent;

use super::{EventSource, StreamError};

/// Test-side handle that pushes events into the source.
#[derive(Clone)]
pub struct LoopbackHandle {
    tx: mpsc::Sender<StreamEvent>,
}

impl LoopbackHandle {
    /// Emit an event toward the consuming source.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the source was dropped.
    pub async fn emit(&self, event: StreamEvent) -> Result<(), StreamError> {
        self.tx.send(event).await.map_err(|_| StreamError::Closed)
    }
}

/// Engine-side event source fed by a [`LoopbackHandle`].
pub struct LoopbackSource {
    rx: mpsc::Receiver<StreamEvent>,
}

/// Create a connected handle/source pair with the given channel capacity.
#[must_use]
pub fn channel(buffer: usize) -> (LoopbackHandle, LoopbackSource) {
    let (tx, rx) = mpsc::channel(buffer);
    (LoopbackHandle { tx }, LoopbackSource { rx })
}

impl EventSource for LoopbackSource {
    async fn next_event(&mut self) -> Result<StreamEvent, StreamError> {
        self.rx.recv().await.ok_or(StreamError::Closed)
    }
}
