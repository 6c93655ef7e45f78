//! Optimistic send pipeline.
//!
//! `submit` makes the message visible instantly: a placeholder goes into
//! the timeline and a [`QueueEntry`] into durable storage in the same
//! breath, then a background task attempts the network send under a
//! bounded timeout. Confirmation — whether from the direct response or
//! the socket echo, whichever lands first — flows through the
//! reconciliation matcher, which replaces the placeholder in place and
//! clears the queue row.
//!
//! On failure or timeout the placeholder turns `Failed` and stays
//! visible; retry is a user action (`resend`), and `discard` is the only
//! path that removes a message without server confirmation.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;

use clubchat_proto::message::{
    ChatMessage, MessageId, QueueEntry, QueueStatus, SendPayload, TempId, UserId,
};
use clubchat_store::StoreError;

use crate::api::{ApiError, ChatApi, CreateMessageRequest};
use crate::storage::LocalStore;

use super::reconcile;
use super::timeline::{DeliveryStatus, TimelineMessage};
use super::{ChatSession, SendError, SendFailure, SessionEvent, SessionState};

/// Length of the random suffix in a temp id.
const TEMP_ID_SUFFIX_LEN: usize = 7;

/// Mint a device-unique temp id: `opt-<millis>-<random>`.
///
/// Collision resistance only needs to hold within one device; the id is
/// never sent to the server.
fn mint_temp_id() -> TempId {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(TEMP_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    TempId::new(format!("opt-{}-{}", Utc::now().timestamp_millis(), suffix))
}

/// Synthesize the placeholder message for a queue entry. The temp id
/// doubles as the message id until confirmation.
fn placeholder_message(entry: &QueueEntry, user_id: &UserId) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(entry.temp_id.as_str()),
        conversation: entry.conversation.clone(),
        sender_id: Some(user_id.clone()),
        content: entry.payload.content.clone(),
        media_urls: entry.payload.media_urls.clone(),
        reply_to_id: entry.payload.reply_to_id.clone(),
        mention_ids: entry.payload.mention_ids.clone(),
        created_at: entry.created_at,
        reactions: Vec::new(),
        read_receipts: Vec::new(),
        poll: None,
    }
}

/// Resurface durable queue entries into a freshly loaded timeline.
///
/// Entries whose payload content-matches an already-confirmed message
/// are returned for purging instead (the send landed but the process
/// died before the queue row was removed). The rest reappear as
/// placeholders; non-failed ones are returned for a new send attempt.
pub(crate) fn resurface_queue(
    state: &mut SessionState,
    entries: Vec<QueueEntry>,
    user_id: &UserId,
) -> (Vec<TempId>, Vec<QueueEntry>) {
    let mut purged = Vec::new();
    let mut to_send = Vec::new();
    for entry in entries {
        let already_confirmed = state.timeline.as_slice().iter().any(|e| {
            e.status == DeliveryStatus::Sent
                && reconcile::entry_matches_confirmed(&entry, &e.message, user_id)
        });
        if already_confirmed {
            tracing::debug!(temp_id = %entry.temp_id, "queued send already confirmed, purging");
            purged.push(entry.temp_id);
            continue;
        }

        let status = match entry.status {
            QueueStatus::Failed => DeliveryStatus::Failed,
            QueueStatus::Queued | QueueStatus::Sending => DeliveryStatus::Sending,
        };
        state.timeline.append(TimelineMessage {
            message: placeholder_message(&entry, user_id),
            status,
            temp_id: Some(entry.temp_id.clone()),
        });
        if entry.status != QueueStatus::Failed {
            to_send.push(entry);
        }
    }
    (purged, to_send)
}

impl<A, Q> ChatSession<A, Q>
where
    A: ChatApi + 'static,
    Q: LocalStore + 'static,
{
    /// Send a message optimistically.
    ///
    /// The placeholder is appended (always newest), the queue entry is
    /// persisted, and the network attempt starts in the background.
    /// Returns the temp id the caller can use for `resend`/`discard`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Validation`] for an empty/oversized payload
    /// (before any state mutation) or
    /// [`SendError::NoActiveConversation`] if nothing is open.
    pub async fn submit(self: &Arc<Self>, payload: SendPayload) -> Result<TempId, SendError> {
        payload.validate()?;

        let entry = {
            let mut state = self.state.lock();
            let Some(conversation) = state.conversation.clone() else {
                return Err(SendError::NoActiveConversation);
            };
            let entry = QueueEntry {
                temp_id: mint_temp_id(),
                conversation,
                payload,
                created_at: Utc::now(),
                status: QueueStatus::Queued,
            };
            state.timeline.append(TimelineMessage {
                message: placeholder_message(&entry, &self.user_id),
                status: DeliveryStatus::Sending,
                temp_id: Some(entry.temp_id.clone()),
            });
            entry
        };
        self.emit(SessionEvent::MessageAppended {
            message_id: MessageId::new(entry.temp_id.as_str()),
        });

        // Persisted before the send attempt: a crash from here on leaves
        // a recoverable row, never a silently lost message.
        if let Err(e) = self.store.add_queue_entry(&entry).await {
            tracing::warn!(error = %e, temp_id = %entry.temp_id, "queue persist failed");
            self.emit(SessionEvent::Error(
                "message sending, but not saved to outbox".into(),
            ));
        }

        let temp_id = entry.temp_id.clone();
        self.start_send(entry);
        Ok(temp_id)
    }

    /// Retry a failed send.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::UnknownMessage`] if no queue entry with this
    /// temp id exists for the open conversation.
    pub async fn resend(self: &Arc<Self>, temp_id: &TempId) -> Result<(), SendError> {
        let conversation = self
            .conversation()
            .ok_or(SendError::NoActiveConversation)?;
        let entries = self.store.load_queue(&conversation).await?;
        let Some(mut entry) = entries.into_iter().find(|e| e.temp_id == *temp_id) else {
            return Err(SendError::UnknownMessage(temp_id.clone()));
        };

        self.state
            .lock()
            .timeline
            .set_status_by_temp(temp_id, DeliveryStatus::Sending);
        self.emit(SessionEvent::SendStateChanged {
            temp_id: temp_id.clone(),
            status: DeliveryStatus::Sending,
        });

        self.store
            .update_queue_status(temp_id, &conversation, QueueStatus::Queued)
            .await?;
        entry.status = QueueStatus::Queued;
        self.start_send(entry);
        Ok(())
    }

    /// Drop a pending message: cancel the in-flight attempt, remove the
    /// placeholder, delete the queue entry.
    ///
    /// This is the only path that removes a message without server
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Storage`] if the queue row removal fails.
    pub async fn discard(&self, temp_id: &TempId) -> Result<(), SendError> {
        self.cancel_send_task(temp_id);
        let (removed, conversation) = {
            let mut state = self.state.lock();
            (
                state.timeline.remove_by_temp(temp_id),
                state.conversation.clone(),
            )
        };
        if removed {
            self.emit(SessionEvent::TimelineChanged);
        }
        if let Some(conversation) = conversation {
            self.store.remove_queue_entry(temp_id, &conversation).await?;
        }
        Ok(())
    }

    /// Spawn the bounded network attempt for a queue entry.
    pub(crate) fn start_send(self: &Arc<Self>, entry: QueueEntry) {
        let session = Arc::clone(self);
        let temp_id = entry.temp_id.clone();
        let task = tokio::spawn(async move { session.run_send(entry).await });
        self.sends.lock().insert(temp_id, task.abort_handle());
    }

    async fn run_send(self: Arc<Self>, entry: QueueEntry) {
        if let Err(e) = self
            .store
            .update_queue_status(&entry.temp_id, &entry.conversation, QueueStatus::Sending)
            .await
        {
            tracing::debug!(error = %e, temp_id = %entry.temp_id, "queue status update failed");
        }

        let request = CreateMessageRequest {
            conversation: entry.conversation.clone(),
            payload: entry.payload.clone(),
        };
        let result =
            tokio::time::timeout(self.config.send_timeout, self.api.create_message(&request))
                .await;
        self.sends.lock().remove(&entry.temp_id);

        match result {
            Ok(Ok(message)) => {
                tracing::debug!(temp_id = %entry.temp_id, message_id = %message.id, "send confirmed");
                if self.is_current(&entry.conversation) {
                    self.ingest_message(message).await;
                } else {
                    // Confirmed after the user moved to another stream;
                    // the queue row is settled, the message will show up
                    // in history on the next open.
                    if let Err(e) = self
                        .store
                        .remove_queue_entry(&entry.temp_id, &entry.conversation)
                        .await
                    {
                        tracing::warn!(error = %e, temp_id = %entry.temp_id, "queue removal failed");
                    }
                }
            }
            Ok(Err(ApiError::Rejected { reason })) => {
                self.fail_send(&entry, SendFailure::Rejected(reason)).await;
            }
            Ok(Err(e)) => {
                self.fail_send(&entry, SendFailure::Network(e.to_string()))
                    .await;
            }
            Err(_elapsed) => {
                self.fail_send(&entry, SendFailure::Timeout).await;
            }
        }
    }

    /// Mark a placeholder failed (no automatic retry).
    async fn fail_send(&self, entry: &QueueEntry, failure: SendFailure) {
        tracing::warn!(temp_id = %entry.temp_id, reason = %failure, "send failed");
        let changed = self
            .state
            .lock()
            .timeline
            .set_status_by_temp(&entry.temp_id, DeliveryStatus::Failed);
        if changed {
            self.emit(SessionEvent::SendFailed {
                temp_id: entry.temp_id.clone(),
                reason: failure.to_string(),
            });
        }
        match self
            .store
            .update_queue_status(&entry.temp_id, &entry.conversation, QueueStatus::Failed)
            .await
        {
            // Discarded while the attempt was in flight.
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => tracing::warn!(error = %e, "queue status update failed"),
        }
    }
}
