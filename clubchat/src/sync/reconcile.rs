//! Reconciliation of authoritative messages against local state.
//!
//! When a server-confirmed message arrives — direct send response or
//! socket broadcast, including the sender's own echo — it either
//! replaces a still-pending optimistic placeholder in place, or it is a
//! genuinely new message. The matcher here decides which, synchronously
//! and totally: no I/O, no failure paths.
//!
//! # Matching rule
//!
//! Only placeholders authored by the local user are candidates, and only
//! those with identical content, sender, reply-to (both null or equal),
//! and mention-id set (order-independent) in the same stream. When
//! several match — the user sent the same text twice rapidly — the
//! oldest placeholder wins: first sent, first confirmed, preserving
//! perceived order. Identity is inferred by content equality rather than
//! a client-supplied idempotency key; the tie-break makes the common
//! duplicate case deterministic.

use clubchat_proto::message::{ChatMessage, MessageId, QueueEntry, TempId, UserId};

use super::timeline::{Timeline, TimelineMessage};
use super::SessionState;

/// What happened to an incoming authoritative message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReconcileOutcome {
    /// A message with this confirmed id already exists; the copy was
    /// dropped (idempotent merge, safe under socket re-delivery).
    Duplicate,
    /// An optimistic placeholder was replaced in place.
    Replaced {
        /// The replaced placeholder's temp id.
        temp_id: TempId,
        /// The confirmed id now occupying its position.
        message_id: MessageId,
    },
    /// The message was new and appended (re-sorted if it arrived out of
    /// order).
    Appended(MessageId),
}

/// Merge one authoritative message into the timeline.
pub(crate) fn reconcile(
    timeline: &mut Timeline,
    message: ChatMessage,
    local_user: &UserId,
) -> ReconcileOutcome {
    if timeline.contains_confirmed(&message.id) {
        tracing::debug!(message_id = %message.id, "duplicate confirmed message dropped");
        return ReconcileOutcome::Duplicate;
    }

    let is_own = message.sender_id.as_ref() == Some(local_user);
    if is_own
        && let Some(index) =
            timeline.oldest_pending_position(|entry| placeholder_matches(entry, &message))
        && let Some(temp_id) = timeline.temp_id_at(index)
    {
        let message_id = message.id.clone();
        timeline.confirm_at(index, message);
        tracing::debug!(temp_id = %temp_id, message_id = %message_id, "placeholder confirmed");
        return ReconcileOutcome::Replaced {
            temp_id,
            message_id,
        };
    }

    let message_id = message.id.clone();
    timeline.insert_confirmed(message);
    ReconcileOutcome::Appended(message_id)
}

/// Candidate predicate from the matching rule.
fn placeholder_matches(entry: &TimelineMessage, message: &ChatMessage) -> bool {
    let placeholder = &entry.message;
    placeholder.sender_id == message.sender_id
        && placeholder.content == message.content
        && placeholder.reply_to_id == message.reply_to_id
        && placeholder.mention_set() == message.mention_set()
}

/// Whether a durable queue entry corresponds to an already-confirmed
/// message (restart-after-confirm race: the send landed but the process
/// died before the queue row was removed).
pub(crate) fn entry_matches_confirmed(
    entry: &QueueEntry,
    message: &ChatMessage,
    local_user: &UserId,
) -> bool {
    use std::collections::BTreeSet;

    if message.sender_id.as_ref() != Some(local_user) {
        return false;
    }
    let entry_mentions: BTreeSet<&UserId> = entry.payload.mention_ids.iter().collect();
    message.content == entry.payload.content
        && message.reply_to_id == entry.payload.reply_to_id
        && message.mention_set() == entry_mentions
}

/// Drain the missed buffer through reconciliation. Called with the
/// session lock held, immediately after a load completes.
pub(crate) fn drain_missed(state: &mut SessionState, local_user: &UserId) -> Vec<ReconcileOutcome> {
    state
        .missed
        .drain()
        .into_iter()
        .map(|message| reconcile(&mut state.timeline, message, local_user))
        .collect()
}
