//! User-initiated message actions: reactions, edits, deletes, read
//! receipts, and the mute/translation preferences.
//!
//! Reactions apply optimistically and roll back to the previous state if
//! the API refuses; everything else applies on confirmation (the socket
//! echo re-applies idempotently either way).

use clubchat_proto::message::MessageId;

use crate::api::ChatApi;
use crate::storage::LocalStore;

use super::{ChatSession, SessionEvent, SyncError};

impl<A, Q> ChatSession<A, Q>
where
    A: ChatApi + 'static,
    Q: LocalStore + 'static,
{
    /// Add or replace the local user's reaction on a message.
    ///
    /// Applied optimistically; rolled back to the previous reaction if
    /// the API call fails.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] when the server refuses; local state
    /// is restored first.
    pub async fn add_reaction(&self, message_id: &MessageId, emoji: &str) -> Result<(), SyncError> {
        let previous = {
            let mut state = self.state.lock();
            let previous = state
                .timeline
                .reaction_of(message_id, &self.user_id)
                .cloned();
            state.timeline.apply_reaction(
                message_id,
                self.user_id.clone(),
                Some(emoji.to_string()),
            );
            previous
        };
        self.emit(SessionEvent::TimelineChanged);

        match self.api.add_reaction(message_id, emoji).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, message_id = %message_id, "reaction add failed");
                self.state.lock().timeline.apply_reaction(
                    message_id,
                    self.user_id.clone(),
                    previous.map(|r| r.emoji),
                );
                self.emit(SessionEvent::TimelineChanged);
                Err(SyncError::Api(e))
            }
        }
    }

    /// Remove the local user's reaction from a message.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] when the server refuses; the removed
    /// reaction is restored first.
    pub async fn remove_reaction(&self, message_id: &MessageId) -> Result<(), SyncError> {
        let previous = {
            let mut state = self.state.lock();
            let previous = state
                .timeline
                .reaction_of(message_id, &self.user_id)
                .cloned();
            state
                .timeline
                .apply_reaction(message_id, self.user_id.clone(), None);
            previous
        };
        self.emit(SessionEvent::TimelineChanged);

        match self.api.remove_reaction(message_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, message_id = %message_id, "reaction remove failed");
                self.state.lock().timeline.apply_reaction(
                    message_id,
                    self.user_id.clone(),
                    previous.map(|r| r.emoji),
                );
                self.emit(SessionEvent::TimelineChanged);
                Err(SyncError::Api(e))
            }
        }
    }

    /// Edit a message's content.
    ///
    /// The server copy is applied on success; client-side status and
    /// temp-id correlation survive the update.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the edit is refused.
    pub async fn edit_message(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<(), SyncError> {
        let updated = self.api.update_message(message_id, content).await?;
        let changed = self.state.lock().timeline.apply_update(updated);
        if changed {
            self.emit(SessionEvent::TimelineChanged);
        }
        Ok(())
    }

    /// Delete a message.
    ///
    /// Removed locally first; a server failure is surfaced non-blocking
    /// (the stream's `message-deleted` event is the authoritative
    /// signal for other clients either way).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the server refuses the deletion.
    pub async fn delete_message(&self, message_id: &MessageId) -> Result<(), SyncError> {
        let removed = self.state.lock().timeline.remove_confirmed(message_id);
        if removed {
            self.emit(SessionEvent::TimelineChanged);
        }
        if let Err(e) = self.api.delete_message(message_id).await {
            tracing::warn!(error = %e, message_id = %message_id, "server delete failed");
            self.emit(SessionEvent::Error(format!("delete failed: {e}")));
            return Err(SyncError::Api(e));
        }
        Ok(())
    }

    /// Record that the local user has read a message and persist the
    /// local read marker used for re-sync.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the receipt call fails.
    pub async fn mark_read(&self, message_id: &MessageId) -> Result<(), SyncError> {
        self.api.mark_read(message_id).await?;
        if let Some(conversation) = self.conversation() {
            self.persist_last_read(&conversation, message_id).await;
        }
        Ok(())
    }

    /// Set the mute preference for the open conversation.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoActiveConversation`] if nothing is open or
    /// [`SyncError::Api`] if the server call fails (local state is then
    /// left unchanged).
    pub async fn set_muted(&self, muted: bool) -> Result<(), SyncError> {
        let conversation = self
            .conversation()
            .ok_or(SyncError::NoActiveConversation)?;
        self.api.set_muted(&conversation, muted).await?;
        self.state.lock().muted = muted;
        Ok(())
    }

    /// Set or clear the translation target for the open conversation.
    ///
    /// # Errors
    ///
    /// Same as [`set_muted`](Self::set_muted).
    pub async fn set_translation(&self, target: Option<&str>) -> Result<(), SyncError> {
        let conversation = self
            .conversation()
            .ok_or(SyncError::NoActiveConversation)?;
        self.api.set_translation(&conversation, target).await?;
        self.state.lock().translation = target.map(str::to_string);
        Ok(())
    }
}
