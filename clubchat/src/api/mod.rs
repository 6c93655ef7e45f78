//! Chat backend API boundary.
//!
//! Defines the [`ChatApi`] trait the engine calls for everything the
//! server owns: message CRUD, reactions, read receipts, pins, mute and
//! translation preferences, and targeted re-sync. Concrete
//! implementations include:
//! - the application's HTTP client (out of scope for this crate)
//! - [`memory::MemoryApi`] — in-process backend for testing

pub mod memory;

use clubchat_proto::message::{
    ChatMessage, ConversationKey, MessageId, SendPayload, UserId,
};

/// Errors that can occur on an API call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The server explicitly refused the request (e.g. sender blocked by
    /// the recipient). Not retried automatically.
    #[error("request rejected: {reason}")]
    Rejected {
        /// Server-provided reason, surfaced to the user.
        reason: String,
    },

    /// Transport-level failure; retrying may succeed.
    #[error("network error: {0}")]
    Network(String),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Request to create a message in a conversation stream.
///
/// The sender identity comes from the authenticated session, not the
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMessageRequest {
    /// The stream to post into.
    pub conversation: ConversationKey,
    /// What to send.
    pub payload: SendPayload,
}

/// One backward page of history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Fetch messages strictly older than this id; `None` means newest.
    pub before: Option<MessageId>,
    /// Page size. A shorter result signals no more older messages.
    pub limit: usize,
}

/// Conversation metadata fetched alongside the first history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    /// Display title (game name, peer name, group name).
    pub title: String,
    /// Users participating in the conversation.
    pub participant_ids: Vec<UserId>,
}

/// Per-user, per-conversation preferences stored server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    /// Whether notifications are muted.
    pub muted: bool,
    /// Target language for inline translation, if enabled.
    pub translation: Option<String>,
}

/// Async boundary to the server-side chat backend.
///
/// Pages returned by [`fetch_messages`](ChatApi::fetch_messages) and
/// [`sync_since`](ChatApi::sync_since) are ascending by `created_at`.
pub trait ChatApi: Send + Sync {
    /// Create a message; returns the authoritative server copy.
    fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> impl std::future::Future<Output = Result<ChatMessage, ApiError>> + Send;

    /// Fetch one backward page of history for a stream.
    fn fetch_messages(
        &self,
        conversation: &ConversationKey,
        page: PageRequest,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, ApiError>> + Send;

    /// Fetch everything newer than `after` in a stream.
    fn sync_since(
        &self,
        conversation: &ConversationKey,
        after: &MessageId,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, ApiError>> + Send;

    /// Edit a message's content; returns the updated server copy.
    fn update_message(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> impl std::future::Future<Output = Result<ChatMessage, ApiError>> + Send;

    /// Delete a message.
    fn delete_message(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Add or replace the caller's reaction on a message.
    fn add_reaction(
        &self,
        message_id: &MessageId,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Remove the caller's reaction from a message.
    fn remove_reaction(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Record that the caller has read a message.
    fn mark_read(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Fetch the pinned messages of a stream, newest pin first.
    fn fetch_pinned(
        &self,
        conversation: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, ApiError>> + Send;

    /// Pin a message.
    fn pin_message(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Unpin a message.
    fn unpin_message(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Fetch conversation metadata.
    fn fetch_context(
        &self,
        conversation: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<ConversationContext, ApiError>> + Send;

    /// Fetch the caller's mute/translation preferences.
    fn fetch_preferences(
        &self,
        conversation: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<Preferences, ApiError>> + Send;

    /// Set the mute preference.
    fn set_muted(
        &self,
        conversation: &ConversationKey,
        muted: bool,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Set (or clear) the translation target language.
    fn set_translation(
        &self,
        conversation: &ConversationKey,
        target: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;
}
