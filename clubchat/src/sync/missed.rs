//! Buffer for live messages that arrive before it is safe to merge them.
//!
//! While the initial history page (or an older-page fetch) is in flight,
//! socket deliveries are parked here instead of being spliced into the
//! timeline, where they could duplicate a page about to land or show a
//! visibly wrong order. The session drains the buffer through the
//! reconciliation path the moment loading completes, so a user never
//! sees a gap between "history as of open" and "what arrived while it
//! loaded".

use clubchat_proto::message::ChatMessage;

/// Per-session holding area for out-of-band messages.
#[derive(Debug)]
pub struct MissedBuffer {
    items: Vec<ChatMessage>,
    cap: usize,
}

impl MissedBuffer {
    /// Create a buffer that holds at most `cap` messages.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            items: Vec::new(),
            cap,
        }
    }

    /// Park a message. Duplicates (same id) are dropped; when the cap is
    /// exceeded the oldest buffered message is evicted.
    pub fn push(&mut self, message: ChatMessage) {
        if self.items.iter().any(|m| m.id == message.id) {
            tracing::debug!(message_id = %message.id, "duplicate buffered message dropped");
            return;
        }
        if self.items.len() >= self.cap {
            tracing::warn!(cap = self.cap, "missed buffer full, evicting oldest");
            self.items.remove(0);
        }
        self.items.push(message);
    }

    /// Take all buffered messages, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<ChatMessage> {
        std::mem::take(&mut self.items)
    }

    /// Drop everything (conversation switch / close).
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
