//! Durable queue survival across simulated restarts.
//!
//! Two engine instances sharing one store stand in for an app restart:
//! the first "crashes" with sends unresolved, the second opens the same
//! conversation and must resurface, re-attempt, and reconcile exactly as
//! a same-session send would.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clubchat::api::memory::MemoryApi;
use clubchat::config::SyncConfig;
use clubchat::storage::{LocalStore, MemoryStore};
use clubchat::sync::ChatSession;
use clubchat::sync::timeline::DeliveryStatus;
use clubchat_proto::message::{
    ConversationKey, QueueEntry, QueueStatus, SendPayload, SubChannel, TempId, UserId,
};

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

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn queued_send_survives_restart_and_reconciles() {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());

    // First launch: the user sends "hello" while the network is dead.
    {
        let (session, _events) =
            ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
        session.open(key()).await.unwrap();

        api.set_stall_sends(true);
        session.submit(SendPayload::text("hello")).await.unwrap();
        assert_eq!(store.queue_len(), 1);
        session.close();
        // Process dies here; the queue row is all that remains.
    }

    // Second launch: network is back.
    api.set_stall_sends(false);
    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
    session.open(key()).await.unwrap();

    // Resurfaced as a sending placeholder, then confirmed like a fresh
    // send: one message, server id, empty queue.
    wait_until(|| {
        session
            .timeline()
            .iter()
            .any(|e| e.status == DeliveryStatus::Sent && e.message.content == "hello")
    })
    .await;

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert!(timeline[0].message.id.as_str().starts_with("srv-"));
    assert_eq!(store.queue_len(), 0);
    assert_eq!(api.message_count(&key()), 1);
}

#[tokio::test]
async fn entry_confirmed_before_crash_is_purged_not_duplicated() {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());

    // The send reached the server, but the process died before the
    // queue row was removed.
    api.accept_message(&key(), &me(), "hello");
    store
        .add_queue_entry(&QueueEntry {
            temp_id: TempId::new("opt-stale"),
            conversation: key(),
            payload: SendPayload::text("hello"),
            created_at: Utc::now(),
            status: QueueStatus::Sending,
        })
        .await
        .unwrap();

    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
    session.open(key()).await.unwrap();

    // Exactly one "hello": the confirmed copy. The stale row is gone.
    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].status, DeliveryStatus::Sent);
    wait_until(|| store.queue_len() == 0).await;
    assert_eq!(api.message_count(&key()), 1);
}

#[tokio::test]
async fn failed_entry_resurfaces_without_automatic_retry() {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());

    store
        .add_queue_entry(&QueueEntry {
            temp_id: TempId::new("opt-failed"),
            conversation: key(),
            payload: SendPayload::text("gave up"),
            created_at: Utc::now(),
            status: QueueStatus::Failed,
        })
        .await
        .unwrap();

    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
    session.open(key()).await.unwrap();

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].status, DeliveryStatus::Failed);

    // Retry is user-triggered only.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.message_count(&key()), 0);
    assert_eq!(store.queue_len(), 1);
}

#[tokio::test]
async fn resend_of_resurfaced_failure_confirms() {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());
    let temp_id = TempId::new("opt-failed");

    store
        .add_queue_entry(&QueueEntry {
            temp_id: temp_id.clone(),
            conversation: key(),
            payload: SendPayload::text("second chance"),
            created_at: Utc::now(),
            status: QueueStatus::Failed,
        })
        .await
        .unwrap();

    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
    session.open(key()).await.unwrap();
    session.resend(&temp_id).await.unwrap();

    wait_until(|| {
        session
            .timeline()
            .first()
            .is_some_and(|e| e.status == DeliveryStatus::Sent)
    })
    .await;
    assert_eq!(store.queue_len(), 0);
}

#[tokio::test]
async fn closing_a_conversation_leaves_the_queue_untouched() {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());

    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), test_config());
    session.open(key()).await.unwrap();

    api.set_stall_sends(true);
    session.submit(SendPayload::text("parting words")).await.unwrap();
    session.close();

    assert_eq!(store.queue_len(), 1);
}
