//! Pinned-message carousel.
//!
//! The UI shows pinned messages as a rotating bar: each click scrolls to
//! the currently-topmost pinned message, then rotates the top pointer
//! backward by one (circular), so repeated clicks cycle through every
//! pin newest-first and wrap around. No client-side pin state is
//! authoritative; pin/unpin delegate to the API and refetch.

use std::sync::Arc;

use clubchat_proto::message::{ChatMessage, MessageId};

use crate::api::ChatApi;
use crate::storage::LocalStore;

use super::{ChatSession, SessionEvent, SyncError};

/// Rotating view over the ordered pinned set.
#[derive(Debug, Default)]
pub struct PinnedCarousel {
    /// Pinned messages in server order (newest pin first).
    messages: Vec<ChatMessage>,
    /// Index of the message currently shown on top.
    top_index: usize,
}

impl PinnedCarousel {
    /// Replace the pinned set and reset rotation to the top.
    pub fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.top_index = 0;
    }

    /// Drop all state (conversation switch / close).
    pub fn clear(&mut self) {
        self.messages.clear();
        self.top_index = 0;
    }

    /// Number of pinned messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the pinned set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The pinned messages in display order, starting at the rotation
    /// point and wrapping around.
    #[must_use]
    pub fn ordered(&self) -> Vec<ChatMessage> {
        let n = self.messages.len();
        (0..n)
            .map(|i| self.messages[(self.top_index + i) % n].clone())
            .collect()
    }

    /// One carousel click: returns the id to scroll to (the current
    /// top) and rotates the top pointer backward by one.
    pub fn advance(&mut self) -> Option<MessageId> {
        let n = self.messages.len();
        if n == 0 {
            return None;
        }
        let top = self.messages[self.top_index].id.clone();
        self.top_index = (self.top_index + n - 1) % n;
        Some(top)
    }

    /// Clamp the rotation pointer after the set shrank.
    pub fn clamp(&mut self) {
        if self.top_index >= self.messages.len() {
            self.top_index = 0;
        }
    }
}

impl<A, Q> ChatSession<A, Q>
where
    A: ChatApi + 'static,
    Q: LocalStore + 'static,
{
    /// Refetch the pinned set from the server.
    ///
    /// Called on open, after pin/unpin, and on `pinned-set-changed`
    /// stream events. A fetch failure clears the carousel rather than
    /// leaving stale pins visible.
    pub async fn refresh_pinned(&self) -> Result<(), SyncError> {
        let Some(conversation) = self.conversation() else {
            return Err(SyncError::NoActiveConversation);
        };
        let result = self.api.fetch_pinned(&conversation).await;
        let mut state = self.state.lock();
        if state.conversation.as_ref() != Some(&conversation) {
            return Ok(());
        }
        match result {
            Ok(messages) => {
                state.pinned.set_messages(messages);
                drop(state);
                self.emit(SessionEvent::PinnedChanged);
                Ok(())
            }
            Err(e) => {
                state.pinned.set_messages(Vec::new());
                drop(state);
                self.emit(SessionEvent::PinnedChanged);
                Err(SyncError::Api(e))
            }
        }
    }

    /// Pin a message, then refetch the authoritative pinned set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the pin call or the refetch fails.
    pub async fn pin_message(&self, message_id: &MessageId) -> Result<(), SyncError> {
        self.api.pin_message(message_id).await?;
        self.refresh_pinned().await
    }

    /// Unpin a message, then refetch the authoritative pinned set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the unpin call or the refetch fails.
    pub async fn unpin_message(&self, message_id: &MessageId) -> Result<(), SyncError> {
        self.api.unpin_message(message_id).await?;
        self.refresh_pinned().await
    }

    /// Pinned messages in carousel display order.
    #[must_use]
    pub fn pinned_ordered(&self) -> Vec<ChatMessage> {
        self.state.lock().pinned.ordered()
    }

    /// One carousel click: rotate and jump to the message that was on
    /// top, paging history backward if it is not currently loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TargetNotFound`] if the pinned message can no
    /// longer be reached, or a history fetch error.
    pub async fn advance_carousel(self: &Arc<Self>) -> Result<(), SyncError> {
        let target = {
            let mut state = self.state.lock();
            state.pinned.advance()
        };
        match target {
            Some(id) => self.jump_to(&id).await,
            None => Ok(()),
        }
    }

    /// Spawn a background pinned refetch, discarding the result if the
    /// session has moved on by the time it lands.
    pub(crate) fn spawn_pinned_refresh(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = session.refresh_pinned().await {
                tracing::warn!(error = %e, "pinned refetch failed");
            }
        });
    }
}
