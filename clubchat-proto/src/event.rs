//! Real-time stream events consumed by the sync engine.
//!
//! The backend delivers these over a socket as JSON text frames (see
//! [`crate::codec`]). The engine never assumes delivery order or
//! exactly-once delivery; every event is safe to re-apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, ConversationKey, MessageId, Poll, UserId};

/// One event from the real-time stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// A new message was created in a conversation stream.
    NewMessage {
        /// Stream the message belongs to.
        conversation: ConversationKey,
        /// The authoritative message.
        message: ChatMessage,
    },
    /// An existing message was edited.
    MessageUpdated {
        /// Stream the message belongs to.
        conversation: ConversationKey,
        /// The updated message, replacing the stored copy.
        message: ChatMessage,
    },
    /// A message was deleted.
    MessageDeleted {
        /// Stream the message belonged to.
        conversation: ConversationKey,
        /// Id of the deleted message.
        message_id: MessageId,
    },
    /// A user added, replaced, or removed a reaction.
    ReactionChanged {
        /// Stream the message belongs to.
        conversation: ConversationKey,
        /// The reacted message.
        message_id: MessageId,
        /// The reacting user.
        user_id: UserId,
        /// The new emoji; `None` means the reaction was removed.
        emoji: Option<String>,
    },
    /// A user read a message.
    ReadReceipt {
        /// Stream the message belongs to.
        conversation: ConversationKey,
        /// The read message.
        message_id: MessageId,
        /// The reading user.
        user_id: UserId,
        /// When the server recorded the read.
        read_at: DateTime<Utc>,
    },
    /// The pinned set for a stream changed; clients must refetch.
    PinnedSetChanged {
        /// Stream whose pinned set changed.
        conversation: ConversationKey,
    },
    /// A poll attached to a message received or lost a vote.
    PollVoteChanged {
        /// Stream the message belongs to.
        conversation: ConversationKey,
        /// The message carrying the poll.
        message_id: MessageId,
        /// The poll with updated vote counts.
        poll: Poll,
    },
    /// The server believes this client may have missed messages and
    /// should request a targeted re-sync.
    SyncRequired,
}

impl StreamEvent {
    /// Returns the conversation key this event is scoped to, if any.
    ///
    /// [`StreamEvent::SyncRequired`] is global and returns `None`.
    #[must_use]
    pub const fn conversation(&self) -> Option<&ConversationKey> {
        match self {
            Self::NewMessage { conversation, .. }
            | Self::MessageUpdated { conversation, .. }
            | Self::MessageDeleted { conversation, .. }
            | Self::ReactionChanged { conversation, .. }
            | Self::ReadReceipt { conversation, .. }
            | Self::PinnedSetChanged { conversation }
            | Self::PollVoteChanged { conversation, .. } => Some(conversation),
            Self::SyncRequired => None,
        }
    }
}
