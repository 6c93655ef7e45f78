//! Durable local state boundary.
//!
//! Defines the [`LocalStore`] trait the engine writes through: the send
//! queue that must survive restarts, and the per-stream last-read marker
//! used for targeted re-sync. The production implementation is
//! [`clubchat_store::Database`] (SQLite); [`MemoryStore`] backs tests.

use std::collections::HashMap;

use parking_lot::Mutex;

use clubchat_proto::message::{ConversationKey, MessageId, QueueEntry, QueueStatus, TempId};
use clubchat_store::StoreError;

/// Trait for persisting the send queue and read markers.
///
/// Each conversation's rows are independent: no method requires a lock
/// spanning conversations, and a restart between an in-memory append and
/// the matching [`add_queue_entry`](LocalStore::add_queue_entry) loses at
/// most that one message, never silently more.
pub trait LocalStore: Send + Sync {
    /// Persist a queue entry (overwrites an existing temp id).
    fn add_queue_entry(
        &self,
        entry: &QueueEntry,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Remove a queue entry; returns whether one existed.
    fn remove_queue_entry(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Update the status of a queue entry.
    fn update_queue_status(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
        status: QueueStatus,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Load all queue entries for one conversation stream, oldest first.
    fn load_queue(
        &self,
        conversation: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<Vec<QueueEntry>, StoreError>> + Send;

    /// Record the newest seen message for a stream.
    fn set_last_read(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Fetch the newest seen message for a stream, if any.
    fn last_read(
        &self,
        conversation: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<Option<MessageId>, StoreError>> + Send;
}

impl LocalStore for clubchat_store::Database {
    async fn add_queue_entry(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        Self::add_queue_entry(self, entry)
    }

    async fn remove_queue_entry(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
    ) -> Result<bool, StoreError> {
        Self::remove_queue_entry(self, temp_id, conversation)
    }

    async fn update_queue_status(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
        status: QueueStatus,
    ) -> Result<(), StoreError> {
        Self::update_queue_status(self, temp_id, conversation, status)
    }

    async fn load_queue(
        &self,
        conversation: &ConversationKey,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        Self::load_queue(self, conversation)
    }

    async fn set_last_read(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        Self::set_last_read(self, conversation, message_id)
    }

    async fn last_read(
        &self,
        conversation: &ConversationKey,
    ) -> Result<Option<MessageId>, StoreError> {
        Self::last_read(self, conversation)
    }
}

/// In-memory implementation of [`LocalStore`] for testing.
///
/// Nothing persists across process restarts; restart tests share one
/// `MemoryStore` between two engine instances instead.
#[derive(Default)]
pub struct MemoryStore {
    queue: Mutex<Vec<QueueEntry>>,
    markers: Mutex<HashMap<ConversationKey, MessageId>>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queue entries across all conversations.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }
}

impl LocalStore for MemoryStore {
    async fn add_queue_entry(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let mut queue = self.queue.lock();
        queue.retain(|e| e.temp_id != entry.temp_id);
        queue.push(entry.clone());
        Ok(())
    }

    async fn remove_queue_entry(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
    ) -> Result<bool, StoreError> {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|e| !(e.temp_id == *temp_id && e.conversation == *conversation));
        Ok(queue.len() < before)
    }

    async fn update_queue_status(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
        status: QueueStatus,
    ) -> Result<(), StoreError> {
        let mut queue = self.queue.lock();
        match queue
            .iter_mut()
            .find(|e| e.temp_id == *temp_id && e.conversation == *conversation)
        {
            Some(entry) => {
                entry.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn load_queue(
        &self,
        conversation: &ConversationKey,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let mut entries: Vec<QueueEntry> = self
            .queue
            .lock()
            .iter()
            .filter(|e| e.conversation == *conversation)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn set_last_read(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        self.markers
            .lock()
            .insert(conversation.clone(), message_id.clone());
        Ok(())
    }

    async fn last_read(
        &self,
        conversation: &ConversationKey,
    ) -> Result<Option<MessageId>, StoreError> {
        Ok(self.markers.lock().get(conversation).cloned())
    }
}
