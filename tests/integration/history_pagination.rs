//! Backward pagination, jump-to-message search, and sub-channel
//! switches.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clubchat::api::memory::MemoryApi;
use clubchat::config::SyncConfig;
use clubchat::storage::{LocalStore, MemoryStore};
use clubchat::sync::timeline::DeliveryStatus;
use clubchat::sync::{ChatSession, SyncError};
use clubchat_proto::message::{
    ConversationKey, MessageId, QueueEntry, QueueStatus, SendPayload, SubChannel, UserId,
};

fn me() -> UserId {
    UserId::new("me")
}

fn key() -> ConversationKey {
    ConversationKey::game("g1", SubChannel::Public)
}

fn setup(config: SyncConfig) -> (
    Arc<ChatSession<MemoryApi, MemoryStore>>,
    Arc<MemoryApi>,
    Arc<MemoryStore>,
) {
    let api = Arc::new(MemoryApi::new(me()));
    let store = Arc::new(MemoryStore::new());
    let (session, _events) =
        ChatSession::new(Arc::clone(&api), Arc::clone(&store), me(), config);
    (session, api, store)
}

/// Seed `count` messages into a stream; returns their server ids in
/// chronological order.
fn seed(api: &MemoryApi, conversation: &ConversationKey, count: usize) -> Vec<MessageId> {
    (0..count)
        .map(|_| {
            api.accept_message(conversation, &UserId::new("other"), "history")
                .id
        })
        .collect()
}

#[tokio::test]
async fn pages_accumulate_until_history_is_exhausted() {
    let (session, api, _store) = setup(SyncConfig::default());
    seed(&api, &key(), 120);

    session.open(key()).await.unwrap();
    assert_eq!(session.timeline().len(), 50);
    assert!(session.has_more());

    assert_eq!(session.load_more().await.unwrap(), 50);
    assert_eq!(session.timeline().len(), 100);
    assert!(session.has_more());

    assert_eq!(session.load_more().await.unwrap(), 20);
    assert_eq!(session.timeline().len(), 120);
    assert!(!session.has_more());

    // Exhausted: further calls are no-ops.
    assert_eq!(session.load_more().await.unwrap(), 0);

    // Chronological order end to end.
    let timeline = session.timeline();
    for pair in timeline.windows(2) {
        assert!(pair[0].message.created_at <= pair[1].message.created_at);
    }
}

#[tokio::test]
async fn short_first_page_means_no_more_history() {
    let (session, api, _store) = setup(SyncConfig::default());
    seed(&api, &key(), 7);

    session.open(key()).await.unwrap();
    assert_eq!(session.timeline().len(), 7);
    assert!(!session.has_more());
}

#[tokio::test]
async fn load_until_pages_in_the_target_and_stops() {
    let (session, api, _store) = setup(SyncConfig::default());
    let ids = seed(&api, &key(), 120);
    let target = ids[60].clone();

    session.open(key()).await.unwrap();
    assert!(!session.timeline().iter().any(|e| e.message.id == target));

    let found = session.load_until(&target).await.unwrap();
    assert!(found);
    assert!(session.timeline().iter().any(|e| e.message.id == target));
    // One extra page was enough; the search stopped there.
    assert_eq!(session.timeline().len(), 100);
}

#[tokio::test]
async fn load_until_gives_up_within_the_page_bound() {
    let (session, api, _store) = setup(SyncConfig {
        jump_search_max_pages: 2,
        ..SyncConfig::default()
    });
    seed(&api, &key(), 500);

    session.open(key()).await.unwrap();
    let found = session
        .load_until(&MessageId::new("no-such-message"))
        .await
        .unwrap();
    assert!(!found);
    // Two pages on top of the first, then it stopped.
    assert_eq!(session.timeline().len(), 150);
}

#[tokio::test]
async fn jump_to_unreachable_message_reports_target_not_found() {
    let (session, api, _store) = setup(SyncConfig {
        jump_search_max_pages: 1,
        ..SyncConfig::default()
    });
    seed(&api, &key(), 200);

    session.open(key()).await.unwrap();
    let result = session.jump_to(&MessageId::new("deleted-long-ago")).await;
    assert!(matches!(result, Err(SyncError::TargetNotFound)));
}

#[tokio::test]
async fn concurrent_load_more_calls_do_not_race() {
    let (session, api, _store) = setup(SyncConfig::default());
    seed(&api, &key(), 120);
    session.open(key()).await.unwrap();

    api.set_gate_history(true);
    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.load_more().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second call while the first is in flight: skipped, not doubled.
    assert_eq!(session.load_more().await.unwrap(), 0);

    api.release_history();
    assert_eq!(first.await.unwrap().unwrap(), 50);
    assert_eq!(session.timeline().len(), 100);
}

#[tokio::test]
async fn failed_page_fetch_leaves_loaded_history_intact() {
    let (session, api, _store) = setup(SyncConfig::default());
    seed(&api, &key(), 120);
    session.open(key()).await.unwrap();

    api.set_fail_history(true);
    let result = session.load_more().await;
    assert!(matches!(result, Err(SyncError::HistoryFetchFailed(_))));
    assert_eq!(session.timeline().len(), 50);
    assert!(session.has_more());

    // Transient: the retry works once the backend recovers.
    api.set_fail_history(false);
    assert_eq!(session.load_more().await.unwrap(), 50);
}

#[tokio::test]
async fn sub_channel_switch_restarts_pagination_and_keeps_queues() {
    let (session, api, store) = setup(SyncConfig::default());
    let public = key();
    let private = public.with_channel(SubChannel::Private);
    seed(&api, &public, 60);
    seed(&api, &private, 5);

    // A failed send parked in each sub-channel's queue.
    for (channel_key, temp) in [(&public, "opt-pub"), (&private, "opt-priv")] {
        store
            .add_queue_entry(&QueueEntry {
                temp_id: clubchat_proto::message::TempId::new(temp),
                conversation: channel_key.clone(),
                payload: SendPayload::text("parked"),
                created_at: Utc::now(),
                status: QueueStatus::Failed,
            })
            .await
            .unwrap();
    }

    session.open(public.clone()).await.unwrap();
    assert_eq!(session.timeline().len(), 51);
    assert!(session.has_more());

    session.switch_channel(SubChannel::Private).await.unwrap();
    assert_eq!(session.conversation(), Some(private.clone()));

    // New stream: its 5 messages plus its own parked placeholder, a
    // fresh cursor, and no leakage from the public channel.
    let timeline = session.timeline();
    assert_eq!(timeline.len(), 6);
    assert!(!session.has_more());
    assert!(
        timeline
            .iter()
            .any(|e| e.status == DeliveryStatus::Failed
                && e.message.conversation == private)
    );

    // Both queue entries still exist: switching never clears queues.
    assert_eq!(store.load_queue(&public).await.unwrap().len(), 1);
    assert_eq!(store.load_queue(&private).await.unwrap().len(), 1);
}

#[tokio::test]
async fn switch_to_same_channel_is_a_no_op() {
    let (session, api, _store) = setup(SyncConfig::default());
    seed(&api, &key(), 3);
    session.open(key()).await.unwrap();

    session.switch_channel(SubChannel::Public).await.unwrap();
    assert_eq!(session.timeline().len(), 3);
}
