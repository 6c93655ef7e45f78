//! Session controller lifecycle: open, preferences, pinned carousel,
//! targeted re-sync, close, and stale-result discarding.

use std::sync::Arc;
use std::time::Duration;

use clubchat::api::memory::MemoryApi;
use clubchat::api::{ChatApi, ConversationContext, Preferences};
use clubchat::config::SyncConfig;
use clubchat::storage::MemoryStore;
use clubchat::sync::{ChatSession, SessionEvent, SessionPhase, SyncError};
use clubchat_proto::event::StreamEvent;
use clubchat_proto::message::{ConversationKey, SubChannel, UserId};

fn me() -> UserId {
    UserId::new("me")
}

fn key() -> ConversationKey {
    ConversationKey::game("g1", SubChannel::Public)
}

fn setup() -> (
    Arc<ChatSession<MemoryApi, MemoryStore>>,
    tokio::sync::mpsc::Receiver<SessionEvent>,
    Arc<MemoryApi>,
) {
    let api = Arc::new(MemoryApi::new(me()));
    let (session, events) = ChatSession::new(
        Arc::clone(&api),
        Arc::new(MemoryStore::new()),
        me(),
        SyncConfig::default(),
    );
    (session, events, api)
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
async fn open_loads_context_and_preferences_without_blocking() {
    let (session, _events, api) = setup();
    api.seed_context(
        &key(),
        ConversationContext {
            title: "Sunday League Final".into(),
            participant_ids: vec![me(), UserId::new("other")],
        },
    );
    api.seed_preferences(
        &key(),
        Preferences {
            muted: true,
            translation: Some("de".into()),
        },
    );

    session.open(key()).await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(
        session.context().map(|c| c.title),
        Some("Sunday League Final".into())
    );

    // Preferences land in the background.
    wait_until(|| session.muted()).await;
    assert_eq!(session.translation(), Some("de".into()));
}

#[tokio::test]
async fn failed_first_page_still_reaches_ready_for_retry() {
    let (session, _events, api) = setup();
    api.set_fail_history(true);

    let result = session.open(key()).await;
    assert!(matches!(result, Err(SyncError::HistoryFetchFailed(_))));
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert!(session.timeline().is_empty());

    api.set_fail_history(false);
    api.accept_message(&key(), &UserId::new("other"), "after recovery");
    session.reload().await.unwrap();
    assert_eq!(session.timeline().len(), 1);
}

#[tokio::test]
async fn close_tears_down_state_and_ignores_later_events() {
    let (session, _events, api) = setup();
    api.accept_message(&key(), &UserId::new("other"), "hello");
    session.open(key()).await.unwrap();
    assert_eq!(session.timeline().len(), 1);

    session.close();
    assert_eq!(session.phase(), SessionPhase::Closed);
    assert_eq!(session.conversation(), None);
    assert!(session.timeline().is_empty());

    let late = api.accept_message(&key(), &UserId::new("other"), "too late");
    session
        .handle_event(StreamEvent::NewMessage {
            conversation: key(),
            message: late,
        })
        .await;
    assert!(session.timeline().is_empty());
}

#[tokio::test]
async fn reopening_after_close_works() {
    let (session, _events, api) = setup();
    api.accept_message(&key(), &UserId::new("other"), "hello");

    session.open(key()).await.unwrap();
    session.close();
    session.open(key()).await.unwrap();

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.timeline().len(), 1);
}

#[tokio::test]
async fn direct_chats_have_no_sub_channels() {
    let (session, _events, _api) = setup();
    session.open(ConversationKey::direct("d1")).await.unwrap();

    let result = session.switch_channel(SubChannel::Private).await;
    assert!(matches!(result, Err(SyncError::NoSubChannels)));
}

#[tokio::test]
async fn stale_open_result_is_discarded_after_close() {
    let (session, _events, api) = setup();
    api.accept_message(&key(), &UserId::new("other"), "hello");
    api.set_gate_history(true);

    let opener = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.open(key()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Navigate away while the first page is still in flight.
    session.close();
    api.release_history();
    opener.await.unwrap().unwrap();

    // The late page was discarded, not applied to the closed session.
    assert_eq!(session.phase(), SessionPhase::Closed);
    assert!(session.timeline().is_empty());
}

#[tokio::test]
async fn sync_required_fills_the_gap_from_last_seen() {
    let (session, _events, api) = setup();
    api.accept_message(&key(), &UserId::new("other"), "a");
    session.open(key()).await.unwrap();
    assert_eq!(session.timeline().len(), 1);

    // Missed while backgrounded.
    api.accept_message(&key(), &UserId::new("other"), "b");
    api.accept_message(&key(), &UserId::new("other"), "c");

    session.handle_event(StreamEvent::SyncRequired).await;

    let contents: Vec<String> = session
        .timeline()
        .iter()
        .map(|e| e.message.content.clone())
        .collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn sync_required_is_idempotent() {
    let (session, _events, api) = setup();
    api.accept_message(&key(), &UserId::new("other"), "a");
    api.accept_message(&key(), &UserId::new("other"), "b");
    session.open(key()).await.unwrap();

    session.handle_event(StreamEvent::SyncRequired).await;
    session.handle_event(StreamEvent::SyncRequired).await;
    assert_eq!(session.timeline().len(), 2);
}

#[tokio::test]
async fn carousel_clicks_cycle_pinned_messages_newest_first() {
    let (session, mut events, api) = setup();
    // Server order [p1, p2, p3]: p3 pinned first, p1 most recently.
    let p3 = api.accept_message(&key(), &UserId::new("other"), "p3");
    let p2 = api.accept_message(&key(), &UserId::new("other"), "p2");
    let p1 = api.accept_message(&key(), &UserId::new("other"), "p1");
    api.seed_pin(&key(), p3.id.clone());
    api.seed_pin(&key(), p2.id.clone());
    api.seed_pin(&key(), p1.id.clone());

    session.open(key()).await.unwrap();
    wait_until(|| session.pinned_ordered().len() == 3).await;

    // Two clicks: scroll to p1, then p3, leaving rotation at p2.
    session.advance_carousel().await.unwrap();
    session.advance_carousel().await.unwrap();
    assert_eq!(session.pinned_ordered()[0].id, p2.id);

    let mut scrolls = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ScrollTo { message_id } = event {
            scrolls.push(message_id);
        }
    }
    assert_eq!(scrolls, vec![p1.id, p3.id]);
}

#[tokio::test]
async fn pin_and_unpin_refetch_the_authoritative_set() {
    let (session, _events, api) = setup();
    let m = api.accept_message(&key(), &UserId::new("other"), "pin me");
    session.open(key()).await.unwrap();

    session.pin_message(&m.id).await.unwrap();
    assert_eq!(session.pinned_ordered().len(), 1);

    session.unpin_message(&m.id).await.unwrap();
    assert!(session.pinned_ordered().is_empty());
}

#[tokio::test]
async fn pinned_set_changed_event_triggers_refetch() {
    let (session, _events, api) = setup();
    let m = api.accept_message(&key(), &UserId::new("other"), "pinned elsewhere");
    session.open(key()).await.unwrap();
    assert!(session.pinned_ordered().is_empty());

    // Another client pins; we only get the change notification.
    api.seed_pin(&key(), m.id.clone());
    session
        .handle_event(StreamEvent::PinnedSetChanged {
            conversation: key(),
        })
        .await;

    wait_until(|| session.pinned_ordered().len() == 1).await;
}

#[tokio::test]
async fn message_deleted_event_removes_and_refetches_pins() {
    let (session, _events, api) = setup();
    let m = api.accept_message(&key(), &UserId::new("other"), "doomed");
    session.open(key()).await.unwrap();
    session.pin_message(&m.id).await.unwrap();

    // Server-side delete: drop it there, then notify.
    api.delete_message(&m.id).await.unwrap();
    session
        .handle_event(StreamEvent::MessageDeleted {
            conversation: key(),
            message_id: m.id.clone(),
        })
        .await;

    assert!(session.timeline().is_empty());
    wait_until(|| session.pinned_ordered().is_empty()).await;
}

#[tokio::test]
async fn mute_and_translation_round_trip() {
    let (session, _events, _api) = setup();
    session.open(key()).await.unwrap();

    session.set_muted(true).await.unwrap();
    assert!(session.muted());

    session.set_translation(Some("fr")).await.unwrap();
    assert_eq!(session.translation(), Some("fr".into()));

    session.set_translation(None).await.unwrap();
    assert_eq!(session.translation(), None);
}
