//! Core data model for conversations and messages.
//!
//! All types in this module cross the boundary between the sync engine,
//! the REST API layer, and the real-time event stream. Server-assigned
//! identifiers are opaque strings; the engine never parses them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed message content size in bytes (64 KB).
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

/// Server-assigned message identifier.
///
/// Placeholders that have not been confirmed yet carry their [`TempId`]
/// value here, so every timeline entry has a usable, unique id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message id from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-local identifier for a not-yet-confirmed outgoing message.
///
/// Generated as `opt-<millis>-<random suffix>`; unique within the device,
/// never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    /// Creates a temp id from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned conversation identifier (game, direct chat, or group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Creates a conversation id from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    /// A game's chat, carrying several parallel sub-channels.
    Game,
    /// A one-to-one direct chat.
    Direct,
    /// A group/channel chat.
    Group,
}

impl ConversationKind {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Game => "GAME",
            Self::Direct => "DIRECT",
            Self::Group => "GROUP",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GAME" => Ok(Self::Game),
            "DIRECT" => Ok(Self::Direct),
            "GROUP" => Ok(Self::Group),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// One of the parallel message streams inside a game conversation.
///
/// Direct and group conversations always use [`SubChannel::Public`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubChannel {
    /// Visible to everyone with access to the conversation.
    #[default]
    Public,
    /// Participants only.
    Private,
    /// Admins only.
    Admins,
    /// Media-only stream.
    Media,
}

impl SubChannel {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
            Self::Admins => "ADMINS",
            Self::Media => "MEDIA",
        }
    }
}

impl fmt::Display for SubChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubChannel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUBLIC" => Ok(Self::Public),
            "PRIVATE" => Ok(Self::Private),
            "ADMINS" => Ok(Self::Admins),
            "MEDIA" => Ok(Self::Media),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized kind or channel label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

/// Composite key identifying one message stream.
///
/// Messages, queue entries, and pagination state are all scoped by this
/// key: conversation kind, conversation id, and (for games) the active
/// sub-channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// The conversation kind.
    pub kind: ConversationKind,
    /// The conversation id.
    pub id: ConversationId,
    /// The sub-channel within the conversation.
    pub channel: SubChannel,
}

impl ConversationKey {
    /// Key for a game conversation's sub-channel.
    pub fn game(id: impl Into<String>, channel: SubChannel) -> Self {
        Self {
            kind: ConversationKind::Game,
            id: ConversationId::new(id),
            channel,
        }
    }

    /// Key for a direct chat. Direct chats have a single stream.
    pub fn direct(id: impl Into<String>) -> Self {
        Self {
            kind: ConversationKind::Direct,
            id: ConversationId::new(id),
            channel: SubChannel::Public,
        }
    }

    /// Key for a group/channel chat. Groups have a single stream.
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: ConversationKind::Group,
            id: ConversationId::new(id),
            channel: SubChannel::Public,
        }
    }

    /// Returns this key with a different sub-channel.
    #[must_use]
    pub fn with_channel(&self, channel: SubChannel) -> Self {
        Self {
            kind: self.kind,
            id: self.id.clone(),
            channel,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.id, self.channel)
    }
}

/// A single user's reaction to a message.
///
/// A message holds at most one reaction per user; a newer reaction from
/// the same user replaces the old one (last write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// The reacting user.
    pub user_id: UserId,
    /// The emoji, as sent by the server.
    pub emoji: String,
}

/// Record that a user has seen a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// The user who read the message.
    pub user_id: UserId,
    /// When the server recorded the read.
    pub read_at: DateTime<Utc>,
}

/// A poll attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Poll identifier.
    pub id: String,
    /// The question text.
    pub question: String,
    /// Poll options with their current votes.
    pub options: Vec<PollOption>,
}

/// One option of a [`Poll`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    /// Option identifier within the poll.
    pub id: String,
    /// Display text.
    pub text: String,
    /// Users who voted for this option.
    pub votes: Vec<UserId>,
}

/// A chat message as the server represents it.
///
/// Before confirmation, optimistic placeholders reuse this type with the
/// temp id in `id` and empty reactions/receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier; unique within the device once confirmed.
    pub id: MessageId,
    /// The stream this message belongs to.
    pub conversation: ConversationKey,
    /// The author; `None` for system messages.
    pub sender_id: Option<UserId>,
    /// Text content (may be empty for media-only messages).
    pub content: String,
    /// Attached media URLs.
    #[serde(default)]
    pub media_urls: Vec<String>,
    /// The message being replied to, if any.
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    /// Mentioned users, in display order.
    #[serde(default)]
    pub mention_ids: Vec<UserId>,
    /// Creation time; the primary ordering key within a stream.
    pub created_at: DateTime<Utc>,
    /// Reactions, at most one per user.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Users who have seen the message.
    #[serde(default)]
    pub read_receipts: Vec<ReadReceipt>,
    /// Attached poll, if any.
    #[serde(default)]
    pub poll: Option<Poll>,
}

impl ChatMessage {
    /// Returns the mention ids as an order-independent set.
    ///
    /// Reconciliation compares mentions as a set; display order is a UI
    /// concern only.
    #[must_use]
    pub fn mention_set(&self) -> BTreeSet<&UserId> {
        self.mention_ids.iter().collect()
    }
}

/// Error returned when an outgoing payload fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Payload has neither text content nor media.
    #[error("message has no content")]
    Empty,
    /// Text content exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// What the user asked to send: everything needed to build a message,
/// minus the identity the server will assign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPayload {
    /// Text content.
    pub content: String,
    /// Attached media URLs.
    #[serde(default)]
    pub media_urls: Vec<String>,
    /// Message being replied to, if any.
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    /// Mentioned users.
    #[serde(default)]
    pub mention_ids: Vec<UserId>,
}

impl SendPayload {
    /// Creates a text-only payload.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media_urls: Vec::new(),
            reply_to_id: None,
            mention_ids: Vec::new(),
        }
    }

    /// Validates this payload for sending.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] if there is neither text nor
    /// media, or [`ValidationError::TooLarge`] if the text exceeds
    /// [`MAX_CONTENT_SIZE`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() && self.media_urls.is_empty() {
            return Err(ValidationError::Empty);
        }
        if self.content.len() > MAX_CONTENT_SIZE {
            return Err(ValidationError::TooLarge {
                size: self.content.len(),
                max: MAX_CONTENT_SIZE,
            });
        }
        Ok(())
    }
}

/// Durable record of a not-yet-confirmed outgoing message.
///
/// One-to-one with an optimistic placeholder while unresolved; removed
/// once the message is confirmed or discarded by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Device-local id tying the entry to its placeholder.
    pub temp_id: TempId,
    /// The stream the message belongs to.
    pub conversation: ConversationKey,
    /// The outgoing payload.
    pub payload: SendPayload,
    /// Local creation time of the placeholder.
    pub created_at: DateTime<Utc>,
    /// Current queue status.
    pub status: QueueStatus,
}

/// Lifecycle of a [`QueueEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Persisted, waiting for a send attempt.
    Queued,
    /// A send attempt is in flight.
    Sending,
    /// The last send attempt failed; waiting for resend or discard.
    Failed,
}

impl QueueStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}
