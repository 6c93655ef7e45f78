//! Ordered, deduplicated message list for one conversation stream.
//!
//! The timeline is the single structure both the history loader and the
//! live stream write into. Every mutation here is synchronous and total:
//! no operation suspends, fails, or leaves the list partially updated,
//! which is what lets the session controller mutate it atomically with
//! respect to the event loop.
//!
//! Ordering invariant: entries are non-decreasing in `created_at`
//! (stable for ties) except transiently inside a splice, which always
//! ends with a re-sort.

use clubchat_proto::message::{
    ChatMessage, MessageId, Poll, Reaction, ReadReceipt, TempId, UserId,
};

/// Client-side delivery lifecycle of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Optimistic placeholder, send in flight.
    Sending,
    /// Confirmed by the server.
    Sent,
    /// Send attempt exhausted; waiting for resend or discard.
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One entry in the visible message list.
///
/// For placeholders, `message.id` carries the temp id value and
/// `temp_id` is set; after reconciliation the server message replaces
/// `message` in place while `temp_id` is kept so the UI can correlate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineMessage {
    /// The message content (authoritative once `status` is `Sent`).
    pub message: ChatMessage,
    /// Client-side delivery status.
    pub status: DeliveryStatus,
    /// Device-local id for entries that began as optimistic sends.
    pub temp_id: Option<TempId>,
}

impl TimelineMessage {
    /// Whether this entry still awaits server confirmation.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, DeliveryStatus::Sending | DeliveryStatus::Failed)
    }
}

/// The ordered message list for one conversation stream.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineMessage>,
}

impl Timeline {
    /// Create an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the timeline is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the ordered entries.
    #[must_use]
    pub fn as_slice(&self) -> &[TimelineMessage] {
        &self.entries
    }

    /// Clone the ordered entries (snapshot for the rendering layer).
    #[must_use]
    pub fn to_vec(&self) -> Vec<TimelineMessage> {
        self.entries.clone()
    }

    /// Replace all entries with a freshly loaded page of confirmed
    /// messages.
    pub fn reset(&mut self, messages: Vec<ChatMessage>) {
        self.entries = messages
            .into_iter()
            .map(|message| TimelineMessage {
                message,
                status: DeliveryStatus::Sent,
                temp_id: None,
            })
            .collect();
        self.resort();
    }

    /// Append an entry at the end (used for optimistic placeholders,
    /// which are always the newest message).
    pub fn append(&mut self, entry: TimelineMessage) {
        self.entries.push(entry);
    }

    /// Insert a confirmed message, re-sorting only if it arrived out of
    /// order.
    pub fn insert_confirmed(&mut self, message: ChatMessage) {
        let in_order = self
            .entries
            .last()
            .is_none_or(|last| last.message.created_at <= message.created_at);
        self.entries.push(TimelineMessage {
            message,
            status: DeliveryStatus::Sent,
            temp_id: None,
        });
        if !in_order {
            self.resort();
        }
    }

    /// Splice an older page in front of the current window.
    ///
    /// Messages whose id is already present are dropped (pages can
    /// overlap with live merges). Returns the number actually inserted.
    pub fn prepend_page(&mut self, page: Vec<ChatMessage>) -> usize {
        let fresh: Vec<TimelineMessage> = page
            .into_iter()
            .filter(|m| !self.contains_id(&m.id))
            .map(|message| TimelineMessage {
                message,
                status: DeliveryStatus::Sent,
                temp_id: None,
            })
            .collect();
        let added = fresh.len();
        if added > 0 {
            self.entries.splice(0..0, fresh);
            self.resort();
        }
        added
    }

    /// Whether a confirmed entry with this server id exists.
    #[must_use]
    pub fn contains_confirmed(&self, id: &MessageId) -> bool {
        self.entries
            .iter()
            .any(|e| e.status == DeliveryStatus::Sent && e.message.id == *id)
    }

    /// Whether any entry (confirmed or placeholder) carries this id.
    #[must_use]
    pub fn contains_id(&self, id: &MessageId) -> bool {
        self.entries.iter().any(|e| e.message.id == *id)
    }

    /// Index of the oldest pending placeholder matching a predicate.
    pub(crate) fn oldest_pending_position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&TimelineMessage) -> bool,
    {
        self.entries
            .iter()
            .position(|e| e.is_pending() && e.temp_id.is_some() && predicate(e))
    }

    /// Temp id of the entry at `index`, if it has one.
    pub(crate) fn temp_id_at(&self, index: usize) -> Option<TempId> {
        self.entries.get(index)?.temp_id.clone()
    }

    /// Replace the entry at `index` with a confirmed message, preserving
    /// list position and the temp id correlation.
    pub(crate) fn confirm_at(&mut self, index: usize, message: ChatMessage) {
        let Some(entry) = self.entries.get_mut(index) else {
            return;
        };
        let temp_id = entry.temp_id.clone();
        *entry = TimelineMessage {
            message,
            status: DeliveryStatus::Sent,
            temp_id,
        };
    }

    /// Set the status of the placeholder with this temp id.
    pub fn set_status_by_temp(&mut self, temp_id: &TempId, status: DeliveryStatus) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.temp_id.as_ref() == Some(temp_id) && e.status != DeliveryStatus::Sent)
        {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove the placeholder with this temp id (discard path).
    pub fn remove_by_temp(&mut self, temp_id: &TempId) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.temp_id.as_ref() == Some(temp_id) && e.status != DeliveryStatus::Sent));
        self.entries.len() < before
    }

    /// Remove the confirmed message with this id (deletion).
    pub fn remove_confirmed(&mut self, id: &MessageId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.message.id != *id);
        self.entries.len() < before
    }

    /// Replace a message's content after an edit, preserving client-side
    /// status and temp id.
    pub fn apply_update(&mut self, message: ChatMessage) -> bool {
        match self.entries.iter_mut().find(|e| e.message.id == message.id) {
            Some(entry) => {
                entry.message = message;
                true
            }
            None => false,
        }
    }

    /// Apply a reaction change: `Some(emoji)` adds or replaces the
    /// user's reaction (last write wins), `None` removes it.
    pub fn apply_reaction(
        &mut self,
        id: &MessageId,
        user_id: UserId,
        emoji: Option<String>,
    ) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == *id) else {
            return false;
        };
        let reactions = &mut entry.message.reactions;
        reactions.retain(|r| r.user_id != user_id);
        if let Some(emoji) = emoji {
            reactions.push(Reaction { user_id, emoji });
        }
        true
    }

    /// The current reaction a user has on a message, if any.
    #[must_use]
    pub fn reaction_of(&self, id: &MessageId, user_id: &UserId) -> Option<&Reaction> {
        self.entries
            .iter()
            .find(|e| e.message.id == *id)?
            .message
            .reactions
            .iter()
            .find(|r| r.user_id == *user_id)
    }

    /// Record that a user has read a message. Idempotent.
    pub fn apply_read_receipt(&mut self, id: &MessageId, receipt: ReadReceipt) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == *id) else {
            return false;
        };
        let receipts = &mut entry.message.read_receipts;
        if !receipts.iter().any(|r| r.user_id == receipt.user_id) {
            receipts.push(receipt);
        }
        true
    }

    /// Replace the poll attached to a message.
    pub fn apply_poll(&mut self, id: &MessageId, poll: Poll) -> bool {
        match self.entries.iter_mut().find(|e| e.message.id == *id) {
            Some(entry) if entry.message.poll.is_some() => {
                entry.message.poll = Some(poll);
                true
            }
            _ => false,
        }
    }

    /// Id of the newest confirmed message, if any.
    #[must_use]
    pub fn newest_confirmed_id(&self) -> Option<&MessageId> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.status == DeliveryStatus::Sent)
            .map(|e| &e.message.id)
    }

    /// Id of the oldest confirmed message (the backward cursor), if any.
    #[must_use]
    pub fn oldest_confirmed_id(&self) -> Option<&MessageId> {
        self.entries
            .iter()
            .find(|e| e.status == DeliveryStatus::Sent)
            .map(|e| &e.message.id)
    }

    /// Stable sort by creation time. Ties keep insertion order, so two
    /// placeholders minted in the same millisecond stay first-sent-first.
    fn resort(&mut self) {
        self.entries
            .sort_by(|a, b| a.message.created_at.cmp(&b.message.created_at));
    }
}
