//! Integration tests for the optimistic send pipeline.
//!
//! Covers the placeholder lifecycle end to end: instant append, queue
//! persistence, confirmation via direct response or socket echo,
//! position-preserving replacement, the oldest-match tie-break, timeout
//! and rejection failures, resend, and discard.

use std::sync::Arc;
use std::time::Duration;

use clubchat::api::memory::MemoryApi;
use clubchat::config::SyncConfig;
use clubchat::storage::MemoryStore;
use clubchat::sync::timeline::DeliveryStatus;
use clubchat::sync::{ChatSession, SendError, SessionEvent};
use clubchat_proto::event::StreamEvent;
use clubchat_proto::message::{ConversationKey, SendPayload, SubChannel, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn me() -> UserId {
    UserId::new("me")
}

fn key() -> ConversationKey {
    ConversationKey::game("g1", SubChannel::Public)
}

fn test_config() -> SyncConfig {
    SyncConfig {
        send_timeout: Duration::from_millis(200),
        ..SyncConfig::default()
    }
}

async fn setup() -> (
    Arc<ChatSession<MemoryApi, MemoryStore>>,
    tokio::sync::mpsc::Receiver<SessionEvent>,
    Arc<MemoryApi>,
    Arc<MemoryStore>,
) {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());
    let (session, events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
    session.open(key()).await.unwrap();
    (session, events, api, store)
}

/// Poll until the condition holds or a couple of seconds pass.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ---------------------------------------------------------------------------
// Send → confirm
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_appends_placeholder_instantly() {
    let (session, _events, api, store) = setup().await;
    api.set_stall_sends(true);

    let temp_id = session.submit(SendPayload::text("hello")).await.unwrap();

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].temp_id, Some(temp_id));
    assert_eq!(timeline[0].status, DeliveryStatus::Sending);
    assert_eq!(store.queue_len(), 1);
}

#[tokio::test]
async fn direct_response_confirms_and_clears_queue() {
    let (session, _events, _api, store) = setup().await;

    session.submit(SendPayload::text("hello")).await.unwrap();

    wait_until(|| {
        session
            .timeline()
            .first()
            .is_some_and(|e| e.status == DeliveryStatus::Sent)
    })
    .await;

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert!(timeline[0].message.id.as_str().starts_with("srv-"));
    assert_eq!(store.queue_len(), 0);
}

#[tokio::test]
async fn socket_echo_replaces_placeholder_when_response_is_slow() {
    let (session, _events, api, store) = setup().await;
    api.set_stall_sends(true);

    let temp_id = session.submit(SendPayload::text("hello")).await.unwrap();

    // The echo for the same content arrives over the stream first.
    let echo = api.accept_message(&key(), &me(), "hello");
    session
        .handle_event(StreamEvent::NewMessage {
            conversation: key(),
            message: echo.clone(),
        })
        .await;

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].message.id, echo.id);
    assert_eq!(timeline[0].status, DeliveryStatus::Sent);
    assert_eq!(timeline[0].temp_id, Some(temp_id));
    assert_eq!(store.queue_len(), 0);
}

#[tokio::test]
async fn replacement_preserves_list_position() {
    let (session, _events, api, _store) = setup().await;
    api.set_stall_sends(true);

    session.submit(SendPayload::text("mine")).await.unwrap();

    // Another user's message lands after the placeholder.
    let other = api.accept_message(&key(), &UserId::new("other"), "theirs");
    session
        .handle_event(StreamEvent::NewMessage {
            conversation: key(),
            message: other,
        })
        .await;
    assert_eq!(session.timeline()[0].message.content, "mine");

    // Now the echo confirms the placeholder: same position, new id.
    let echo = api.accept_message(&key(), &me(), "mine");
    session
        .handle_event(StreamEvent::NewMessage {
            conversation: key(),
            message: echo,
        })
        .await;

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].message.content, "mine");
    assert_eq!(timeline[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn oldest_duplicate_placeholder_is_confirmed_first() {
    let (session, _events, api, _store) = setup().await;
    api.set_stall_sends(true);

    let first = session.submit(SendPayload::text("same")).await.unwrap();
    let second = session.submit(SendPayload::text("same")).await.unwrap();

    let echo = api.accept_message(&key(), &me(), "same");
    session
        .handle_event(StreamEvent::NewMessage {
            conversation: key(),
            message: echo,
        })
        .await;

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].temp_id, Some(first));
    assert_eq!(timeline[0].status, DeliveryStatus::Sent);
    assert_eq!(timeline[1].temp_id, Some(second));
    assert_eq!(timeline[1].status, DeliveryStatus::Sending);
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeout_marks_placeholder_failed_and_keeps_it_visible() {
    let (session, _events, api, store) = setup().await;
    api.set_stall_sends(true);

    session.submit(SendPayload::text("stuck")).await.unwrap();

    wait_until(|| {
        session
            .timeline()
            .first()
            .is_some_and(|e| e.status == DeliveryStatus::Failed)
    })
    .await;

    // Still visible, still queued (recoverable), never auto-retried.
    assert_eq!(session.timeline().len(), 1);
    assert_eq!(store.queue_len(), 1);
    assert_eq!(api.message_count(&key()), 0);
}

#[tokio::test]
async fn rejected_send_fails_without_retry() {
    let (session, mut events, api, _store) = setup().await;
    api.set_reject_sends(true);

    let temp_id = session.submit(SendPayload::text("nope")).await.unwrap();

    wait_until(|| {
        session
            .timeline()
            .first()
            .is_some_and(|e| e.status == DeliveryStatus::Failed)
    })
    .await;

    let mut saw_rejection = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SendFailed { temp_id: t, reason } = event {
            assert_eq!(t, temp_id);
            assert!(reason.contains("rejected"));
            saw_rejection = true;
        }
    }
    assert!(saw_rejection);
}

#[tokio::test]
async fn empty_payload_is_rejected_before_any_mutation() {
    let (session, _events, _api, store) = setup().await;

    let result = session.submit(SendPayload::text("   ")).await;
    assert!(matches!(result, Err(SendError::Validation(_))));
    assert!(session.timeline().is_empty());
    assert_eq!(store.queue_len(), 0);
}

#[tokio::test]
async fn submit_without_open_conversation_is_a_no_op() {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());
    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());

    let result = session.submit(SendPayload::text("hello")).await;
    assert!(matches!(result, Err(SendError::NoActiveConversation)));
    assert_eq!(store.queue_len(), 0);
}

// ---------------------------------------------------------------------------
// Resend / discard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resend_after_failure_eventually_confirms() {
    let (session, _events, api, store) = setup().await;
    api.set_fail_sends(true);

    let temp_id = session.submit(SendPayload::text("retry me")).await.unwrap();
    wait_until(|| {
        session
            .timeline()
            .first()
            .is_some_and(|e| e.status == DeliveryStatus::Failed)
    })
    .await;

    api.set_fail_sends(false);
    session.resend(&temp_id).await.unwrap();

    wait_until(|| {
        session
            .timeline()
            .first()
            .is_some_and(|e| e.status == DeliveryStatus::Sent)
    })
    .await;
    assert_eq!(store.queue_len(), 0);
    assert_eq!(api.message_count(&key()), 1);
}

#[tokio::test]
async fn resend_of_unknown_temp_id_errors() {
    let (session, _events, _api, _store) = setup().await;
    let result = session
        .resend(&clubchat_proto::message::TempId::new("opt-ghost"))
        .await;
    assert!(matches!(result, Err(SendError::UnknownMessage(_))));
}

#[tokio::test]
async fn discard_removes_placeholder_queue_and_cancels_send() {
    let (session, _events, api, store) = setup().await;
    api.set_stall_sends(true);

    let temp_id = session.submit(SendPayload::text("never mind")).await.unwrap();
    assert_eq!(store.queue_len(), 1);

    session.discard(&temp_id).await.unwrap();

    assert!(session.timeline().is_empty());
    assert_eq!(store.queue_len(), 0);

    // Nothing surfaces later: the in-flight attempt was cancelled.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.timeline().is_empty());
    assert_eq!(api.message_count(&key()), 0);
}
