//! In-memory chat backend for testing.
//!
//! Holds per-stream message lists in process and mints `srv-<n>` ids, so
//! engine tests can drive sends, pagination, and re-sync without a
//! server. Failure modes are switchable at runtime: sends can be made to
//! fail, be rejected, or stall past any timeout, and history fetches can
//! be made to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;

use clubchat_proto::message::{ChatMessage, ConversationKey, MessageId, UserId};

use super::{
    ApiError, ChatApi, ConversationContext, CreateMessageRequest, PageRequest, Preferences,
};

#[derive(Default)]
struct Inner {
    /// Messages per stream, ascending by `created_at`.
    messages: HashMap<ConversationKey, Vec<ChatMessage>>,
    /// Pinned ids per stream, newest pin first.
    pinned: HashMap<ConversationKey, Vec<MessageId>>,
    contexts: HashMap<ConversationKey, ConversationContext>,
    preferences: HashMap<ConversationKey, Preferences>,
    next_id: u64,
}

/// In-process [`ChatApi`] implementation backing the test suites.
pub struct MemoryApi {
    /// The authenticated user on whose behalf calls are made.
    user_id: UserId,
    inner: Mutex<Inner>,
    fail_sends: AtomicBool,
    reject_sends: AtomicBool,
    stall_sends: AtomicBool,
    fail_history: AtomicBool,
    gate_history: AtomicBool,
    history_gate: Notify,
}

impl MemoryApi {
    /// Create a backend authenticated as `user_id`.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            inner: Mutex::new(Inner::default()),
            fail_sends: AtomicBool::new(false),
            reject_sends: AtomicBool::new(false),
            stall_sends: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            gate_history: AtomicBool::new(false),
            history_gate: Notify::new(),
        }
    }

    /// Make subsequent sends fail with a network error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent sends be rejected by the server.
    pub fn set_reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent sends hang forever (drives timeout paths).
    pub fn set_stall_sends(&self, stall: bool) {
        self.stall_sends.store(stall, Ordering::SeqCst);
    }

    /// Make subsequent history fetches fail with a network error.
    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    /// Hold history fetches at a gate until [`release_history`] is
    /// called, so tests can interleave stream arrivals with a load.
    ///
    /// [`release_history`]: Self::release_history
    pub fn set_gate_history(&self, gate: bool) {
        self.gate_history.store(gate, Ordering::SeqCst);
    }

    /// Let one gated history fetch proceed.
    pub fn release_history(&self) {
        self.history_gate.notify_one();
    }

    /// Insert a message as if another client had created it earlier.
    pub fn seed_message(&self, message: ChatMessage) {
        let mut inner = self.inner.lock();
        let list = inner.messages.entry(message.conversation.clone()).or_default();
        list.push(message);
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    /// Set the metadata returned by `fetch_context`.
    pub fn seed_context(&self, conversation: &ConversationKey, context: ConversationContext) {
        self.inner
            .lock()
            .contexts
            .insert(conversation.clone(), context);
    }

    /// Set the preferences returned by `fetch_preferences`.
    pub fn seed_preferences(&self, conversation: &ConversationKey, preferences: Preferences) {
        self.inner
            .lock()
            .preferences
            .insert(conversation.clone(), preferences);
    }

    /// Pin an id directly, bypassing the API call.
    pub fn seed_pin(&self, conversation: &ConversationKey, message_id: MessageId) {
        self.inner
            .lock()
            .pinned
            .entry(conversation.clone())
            .or_default()
            .insert(0, message_id);
    }

    /// Number of stored messages in a stream.
    #[must_use]
    pub fn message_count(&self, conversation: &ConversationKey) -> usize {
        self.inner
            .lock()
            .messages
            .get(conversation)
            .map_or(0, Vec::len)
    }

    /// Create a server message for the given sender, as the socket echo
    /// of `create_message` would. Returns the stored copy.
    pub fn accept_message(
        &self,
        conversation: &ConversationKey,
        sender: &UserId,
        content: &str,
    ) -> ChatMessage {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let message = ChatMessage {
            id: MessageId::new(format!("srv-{}", inner.next_id)),
            conversation: conversation.clone(),
            sender_id: Some(sender.clone()),
            content: content.to_string(),
            media_urls: Vec::new(),
            reply_to_id: None,
            mention_ids: Vec::new(),
            created_at: Utc::now(),
            reactions: Vec::new(),
            read_receipts: Vec::new(),
            poll: None,
        };
        inner
            .messages
            .entry(conversation.clone())
            .or_default()
            .push(message.clone());
        message
    }

    fn find_message(inner: &Inner, id: &MessageId) -> Option<(ConversationKey, usize)> {
        for (key, list) in &inner.messages {
            if let Some(pos) = list.iter().position(|m| m.id == *id) {
                return Some((key.clone(), pos));
            }
        }
        None
    }
}

impl ChatApi for MemoryApi {
    async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<ChatMessage, ApiError> {
        if self.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".into()));
        }
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                reason: "blocked by recipient".into(),
            });
        }

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let message = ChatMessage {
            id: MessageId::new(format!("srv-{}", inner.next_id)),
            conversation: request.conversation.clone(),
            sender_id: Some(self.user_id.clone()),
            content: request.payload.content.clone(),
            media_urls: request.payload.media_urls.clone(),
            reply_to_id: request.payload.reply_to_id.clone(),
            mention_ids: request.payload.mention_ids.clone(),
            created_at: Utc::now(),
            reactions: Vec::new(),
            read_receipts: Vec::new(),
            poll: None,
        };
        inner
            .messages
            .entry(request.conversation.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn fetch_messages(
        &self,
        conversation: &ConversationKey,
        page: PageRequest,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ApiError::Network("history unavailable".into()));
        }
        if self.gate_history.load(Ordering::SeqCst) {
            self.history_gate.notified().await;
        }
        let inner = self.inner.lock();
        let Some(list) = inner.messages.get(conversation) else {
            return Ok(Vec::new());
        };
        let window_end = match &page.before {
            Some(before) => match list.iter().position(|m| m.id == *before) {
                Some(pos) => pos,
                None => return Ok(Vec::new()),
            },
            None => list.len(),
        };
        let window_start = window_end.saturating_sub(page.limit);
        Ok(list[window_start..window_end].to_vec())
    }

    async fn sync_since(
        &self,
        conversation: &ConversationKey,
        after: &MessageId,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let inner = self.inner.lock();
        let Some(list) = inner.messages.get(conversation) else {
            return Ok(Vec::new());
        };
        let start = list
            .iter()
            .position(|m| m.id == *after)
            .map_or(0, |pos| pos + 1);
        Ok(list[start..].to_vec())
    }

    async fn update_message(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        let mut inner = self.inner.lock();
        let Some((key, pos)) = Self::find_message(&inner, message_id) else {
            return Err(ApiError::Rejected {
                reason: "message not found".into(),
            });
        };
        let list = inner.messages.get_mut(&key).ok_or_else(|| {
            ApiError::Decode("stream vanished".into())
        })?;
        list[pos].content = content.to_string();
        Ok(list[pos].clone())
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        if let Some((key, pos)) = Self::find_message(&inner, message_id) {
            if let Some(list) = inner.messages.get_mut(&key) {
                list.remove(pos);
            }
            if let Some(pins) = inner.pinned.get_mut(&key) {
                pins.retain(|id| id != message_id);
            }
        }
        Ok(())
    }

    async fn add_reaction(&self, message_id: &MessageId, emoji: &str) -> Result<(), ApiError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".into()));
        }
        let mut inner = self.inner.lock();
        let user_id = self.user_id.clone();
        if let Some((key, pos)) = Self::find_message(&inner, message_id)
            && let Some(list) = inner.messages.get_mut(&key)
        {
            let reactions = &mut list[pos].reactions;
            reactions.retain(|r| r.user_id != user_id);
            reactions.push(clubchat_proto::message::Reaction {
                user_id,
                emoji: emoji.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_reaction(&self, message_id: &MessageId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        let user_id = self.user_id.clone();
        if let Some((key, pos)) = Self::find_message(&inner, message_id)
            && let Some(list) = inner.messages.get_mut(&key)
        {
            list[pos].reactions.retain(|r| r.user_id != user_id);
        }
        Ok(())
    }

    async fn mark_read(&self, message_id: &MessageId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        let user_id = self.user_id.clone();
        if let Some((key, pos)) = Self::find_message(&inner, message_id)
            && let Some(list) = inner.messages.get_mut(&key)
        {
            let receipts = &mut list[pos].read_receipts;
            if !receipts.iter().any(|r| r.user_id == user_id) {
                receipts.push(clubchat_proto::message::ReadReceipt {
                    user_id,
                    read_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    async fn fetch_pinned(
        &self,
        conversation: &ConversationKey,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let inner = self.inner.lock();
        let ids = inner.pinned.get(conversation).cloned().unwrap_or_default();
        let list = inner.messages.get(conversation);
        Ok(ids
            .iter()
            .filter_map(|id| {
                list.and_then(|msgs| msgs.iter().find(|m| m.id == *id).cloned())
            })
            .collect())
    }

    async fn pin_message(&self, message_id: &MessageId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        let Some((key, _)) = Self::find_message(&inner, message_id) else {
            return Err(ApiError::Rejected {
                reason: "message not found".into(),
            });
        };
        let pins = inner.pinned.entry(key).or_default();
        if !pins.contains(message_id) {
            pins.insert(0, message_id.clone());
        }
        Ok(())
    }

    async fn unpin_message(&self, message_id: &MessageId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        for pins in inner.pinned.values_mut() {
            pins.retain(|id| id != message_id);
        }
        Ok(())
    }

    async fn fetch_context(
        &self,
        conversation: &ConversationKey,
    ) -> Result<ConversationContext, ApiError> {
        Ok(self
            .inner
            .lock()
            .contexts
            .get(conversation)
            .cloned()
            .unwrap_or(ConversationContext {
                title: conversation.id.as_str().to_string(),
                participant_ids: Vec::new(),
            }))
    }

    async fn fetch_preferences(
        &self,
        conversation: &ConversationKey,
    ) -> Result<Preferences, ApiError> {
        Ok(self
            .inner
            .lock()
            .preferences
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_muted(
        &self,
        conversation: &ConversationKey,
        muted: bool,
    ) -> Result<(), ApiError> {
        self.inner
            .lock()
            .preferences
            .entry(conversation.clone())
            .or_default()
            .muted = muted;
        Ok(())
    }

    async fn set_translation(
        &self,
        conversation: &ConversationKey,
        target: Option<&str>,
    ) -> Result<(), ApiError> {
        self.inner
            .lock()
            .preferences
            .entry(conversation.clone())
            .or_default()
            .translation = target.map(str::to_string);
        Ok(())
    }
}
