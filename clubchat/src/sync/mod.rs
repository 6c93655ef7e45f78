//! Conversation session controller.
//!
//! A [`ChatSession`] owns everything for the currently open
//! conversation: the ordered [`Timeline`], the optimistic outbox, the
//! missed-message buffer, pagination state, and the pinned carousel. It
//! orchestrates loads on open and sub-channel switches, routes stream
//! events, and notifies the UI through a [`SessionEvent`] channel.
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Loading → Ready ⇄ SwitchingSubChannel
//!                    ↓
//!                  Closed
//! ```
//!
//! Every open/switch/close bumps an epoch counter; async results landing
//! after the epoch moved are discarded, which is how in-flight fetches
//! for an abandoned context are "cancelled". Send tasks are deliberately
//! exempt: they are conversation-scoped, not view-scoped, and run to
//! completion even after the user navigates away.
//!
//! # Locking
//!
//! All session state sits behind one [`parking_lot::Mutex`]. Mutations
//! are synchronous and never span an await point; API and storage calls
//! happen strictly outside the lock.

pub mod actions;
pub mod history;
pub mod missed;
pub mod outbox;
pub mod pinned;
pub mod reconcile;
pub mod timeline;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use clubchat_proto::event::StreamEvent;
use clubchat_proto::message::{
    ConversationKey, ConversationKind, MessageId, SubChannel, TempId, UserId, ValidationError,
};
use clubchat_store::StoreError;

use crate::api::{ApiError, ChatApi, ConversationContext, PageRequest};
use crate::config::SyncConfig;
use crate::storage::LocalStore;

use missed::MissedBuffer;
use pinned::PinnedCarousel;
use reconcile::ReconcileOutcome;
use timeline::{DeliveryStatus, Timeline, TimelineMessage};

/// Errors returned by send-path operations (submit/resend/discard).
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The payload failed validation; no state was mutated.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No conversation is open; the submit was a no-op.
    #[error("no active conversation")]
    NoActiveConversation,

    /// No pending message with the given temp id exists.
    #[error("no pending message with temp id {0}")]
    UnknownMessage(TempId),

    /// Durable queue access failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Why a send attempt left its placeholder in the failed state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendFailure {
    /// No confirmation arrived within the configured bound.
    #[error("send timed out")]
    Timeout,

    /// The server explicitly refused the message.
    #[error("send rejected: {0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Errors returned by load/jump/preference operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A history page could not be fetched. Already-loaded pages are
    /// untouched; the caller may retry.
    #[error("history fetch failed: {0}")]
    HistoryFetchFailed(ApiError),

    /// The jump target was not found within the search bound.
    #[error("message no longer available")]
    TargetNotFound,

    /// No conversation is open.
    #[error("no active conversation")]
    NoActiveConversation,

    /// The operation requires a game conversation with sub-channels.
    #[error("conversation has no sub-channels")]
    NoSubChannels,

    /// An API call failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Durable storage access failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Lifecycle phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No conversation open yet.
    Idle,
    /// Context and first page loading.
    Loading,
    /// Timeline live; stream events apply directly.
    Ready,
    /// User switched sub-channels; new first page loading.
    SwitchingSubChannel,
    /// User navigated away; state torn down, queue untouched.
    Closed,
}

/// Notifications for the rendering layer.
///
/// The UI treats the timeline snapshot as the source of truth and uses
/// these only to know when to re-read it (and where to scroll).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new entry was appended at the tail (optimistic or remote).
    MessageAppended {
        /// Id of the appended entry (temp id value for placeholders).
        message_id: MessageId,
    },
    /// A placeholder was replaced in place by its confirmation.
    MessageReplaced {
        /// The placeholder's temp id.
        temp_id: TempId,
        /// The confirmed server id now in its position.
        message_id: MessageId,
    },
    /// A pending send's status changed (e.g. resend back to sending).
    SendStateChanged {
        /// The placeholder's temp id.
        temp_id: TempId,
        /// The new delivery status.
        status: DeliveryStatus,
    },
    /// A send attempt gave up; the placeholder is now failed.
    SendFailed {
        /// The placeholder's temp id.
        temp_id: TempId,
        /// Why the send failed.
        reason: String,
    },
    /// The timeline was replaced wholesale (open / sub-channel switch).
    TimelineReset,
    /// Older history was spliced in front of the window.
    HistoryPrepended {
        /// Number of messages inserted.
        count: usize,
    },
    /// In-place change: edit, delete, reaction, receipt, or poll.
    TimelineChanged,
    /// The pinned set changed; re-read the carousel.
    PinnedChanged,
    /// The UI should scroll to this message (jump / carousel).
    ScrollTo {
        /// The target message.
        message_id: MessageId,
    },
    /// A non-blocking failure worth surfacing (toast-style).
    Error(String),
}

/// Mutable per-conversation state, all behind one lock.
pub(crate) struct SessionState {
    pub(crate) conversation: Option<ConversationKey>,
    pub(crate) phase: SessionPhase,
    /// Bumped on every open/switch/close; stale async results check it.
    pub(crate) epoch: u64,
    pub(crate) timeline: Timeline,
    pub(crate) missed: MissedBuffer,
    pub(crate) pinned: PinnedCarousel,
    pub(crate) has_more: bool,
    /// Re-entrancy guard for older-page fetches.
    pub(crate) loading_more: bool,
    pub(crate) context: Option<ConversationContext>,
    pub(crate) muted: bool,
    pub(crate) translation: Option<String>,
}

/// Per-conversation sync engine: optimistic sends, reconciliation,
/// missed-message buffering, pagination, pins.
pub struct ChatSession<A: ChatApi, Q: LocalStore> {
    pub(crate) api: Arc<A>,
    pub(crate) store: Arc<Q>,
    /// The local (authenticated) user; reconciliation only matches own
    /// placeholders.
    pub(crate) user_id: UserId,
    pub(crate) config: SyncConfig,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) event_tx: mpsc::Sender<SessionEvent>,
    /// Abort handles for in-flight send tasks, keyed by temp id.
    pub(crate) sends: Mutex<HashMap<TempId, AbortHandle>>,
}

impl<A, Q> ChatSession<A, Q>
where
    A: ChatApi + 'static,
    Q: LocalStore + 'static,
{
    /// Create a session for the given user.
    ///
    /// Returns the session and the receiver for [`SessionEvent`]s the
    /// UI layer should consume.
    #[must_use]
    pub fn new(
        api: Arc<A>,
        store: Arc<Q>,
        user_id: UserId,
        config: SyncConfig,
    ) -> (Arc<Self>, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let session = Arc::new(Self {
            api,
            store,
            user_id,
            state: Mutex::new(SessionState {
                conversation: None,
                phase: SessionPhase::Idle,
                epoch: 0,
                timeline: Timeline::new(),
                missed: MissedBuffer::new(config.missed_buffer_cap),
                pinned: PinnedCarousel::default(),
                has_more: true,
                loading_more: false,
                context: None,
                muted: false,
                translation: None,
            }),
            config,
            event_tx,
            sends: Mutex::new(HashMap::new()),
        });
        (session, event_rx)
    }

    /// Open a conversation: fetch context and the first history page
    /// concurrently, resurface the durable queue, drain anything that
    /// arrived over the stream meanwhile.
    ///
    /// Preferences (mute, translation) load in the background and never
    /// block message display.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::HistoryFetchFailed`] if the first page could
    /// not be fetched; the session still reaches `Ready` (empty) so the
    /// caller can offer a retry via [`reload`](Self::reload).
    pub async fn open(self: &Arc<Self>, conversation: ConversationKey) -> Result<(), SyncError> {
        tracing::info!(conversation = %conversation, "opening conversation");
        let epoch = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.conversation = Some(conversation.clone());
            state.phase = SessionPhase::Loading;
            state.timeline = Timeline::new();
            state.missed.clear();
            state.pinned.clear();
            state.has_more = true;
            state.loading_more = false;
            state.context = None;
            state.muted = false;
            state.translation = None;
            state.epoch
        };
        self.run_initial_load(conversation, epoch).await
    }

    /// Switch the active sub-channel of a game conversation.
    ///
    /// Discards page/cursor state and the timeline, restarts pagination
    /// from the newest message of the new sub-channel, and resurfaces
    /// that sub-channel's queued sends. In-flight sends for the previous
    /// sub-channel keep running; they belong to that stream.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSubChannels`] for non-game conversations,
    /// [`SyncError::NoActiveConversation`] if nothing is open, or a
    /// history fetch error.
    pub async fn switch_channel(self: &Arc<Self>, channel: SubChannel) -> Result<(), SyncError> {
        let (conversation, epoch) = {
            let mut state = self.state.lock();
            let Some(current) = state.conversation.clone() else {
                return Err(SyncError::NoActiveConversation);
            };
            if current.kind != ConversationKind::Game {
                return Err(SyncError::NoSubChannels);
            }
            if current.channel == channel {
                return Ok(());
            }
            let next = current.with_channel(channel);
            tracing::info!(conversation = %next, "switching sub-channel");
            state.epoch += 1;
            state.conversation = Some(next.clone());
            state.phase = SessionPhase::SwitchingSubChannel;
            state.timeline = Timeline::new();
            state.missed.clear();
            state.pinned.clear();
            state.has_more = true;
            state.loading_more = false;
            (next, state.epoch)
        };
        self.run_initial_load(conversation, epoch).await
    }

    /// Reload the current conversation from scratch (retry affordance
    /// after a failed first page).
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub async fn reload(self: &Arc<Self>) -> Result<(), SyncError> {
        let conversation = self
            .conversation()
            .ok_or(SyncError::NoActiveConversation)?;
        self.open(conversation).await
    }

    /// Close the session: tear down in-memory state and invalidate
    /// in-flight context/history fetches.
    ///
    /// The durable send queue is untouched and send tasks keep running;
    /// a send may only be cancelled via [`discard`](Self::discard).
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.phase = SessionPhase::Closed;
        state.conversation = None;
        state.timeline = Timeline::new();
        state.missed.clear();
        state.pinned.clear();
        state.context = None;
        tracing::info!("session closed");
    }

    /// Route one stream event into the session.
    ///
    /// Events for other conversations are ignored; this session only
    /// tracks the open one. `SyncRequired` is global and triggers a
    /// targeted re-sync from the newest loaded message.
    pub async fn handle_event(self: &Arc<Self>, event: StreamEvent) {
        match event {
            StreamEvent::SyncRequired => self.resync().await,
            StreamEvent::NewMessage {
                conversation,
                message,
            } => {
                if self.is_current(&conversation) {
                    self.ingest_message(message).await;
                }
            }
            StreamEvent::MessageUpdated {
                conversation,
                message,
            } => {
                if !self.is_current(&conversation) {
                    return;
                }
                let changed = self.state.lock().timeline.apply_update(message);
                if changed {
                    self.emit(SessionEvent::TimelineChanged);
                }
            }
            StreamEvent::MessageDeleted {
                conversation,
                message_id,
            } => {
                if !self.is_current(&conversation) {
                    return;
                }
                let removed = self.state.lock().timeline.remove_confirmed(&message_id);
                if removed {
                    self.emit(SessionEvent::TimelineChanged);
                }
                // A deletion may have taken a pinned message with it.
                self.spawn_pinned_refresh();
            }
            StreamEvent::ReactionChanged {
                conversation,
                message_id,
                user_id,
                emoji,
            } => {
                if !self.is_current(&conversation) {
                    return;
                }
                let changed = self
                    .state
                    .lock()
                    .timeline
                    .apply_reaction(&message_id, user_id, emoji);
                if changed {
                    self.emit(SessionEvent::TimelineChanged);
                }
            }
            StreamEvent::ReadReceipt {
                conversation,
                message_id,
                user_id,
                read_at,
            } => {
                if !self.is_current(&conversation) {
                    return;
                }
                let changed = self.state.lock().timeline.apply_read_receipt(
                    &message_id,
                    clubchat_proto::message::ReadReceipt { user_id, read_at },
                );
                if changed {
                    self.emit(SessionEvent::TimelineChanged);
                }
            }
            StreamEvent::PinnedSetChanged { conversation } => {
                if self.is_current(&conversation) {
                    self.spawn_pinned_refresh();
                }
            }
            StreamEvent::PollVoteChanged {
                conversation,
                message_id,
                poll,
            } => {
                if !self.is_current(&conversation) {
                    return;
                }
                let changed = self.state.lock().timeline.apply_poll(&message_id, poll);
                if changed {
                    self.emit(SessionEvent::TimelineChanged);
                }
            }
        }
    }

    // -- snapshot accessors (rendering layer is a pure consumer) --

    /// Snapshot of the ordered, deduplicated message list.
    #[must_use]
    pub fn timeline(&self) -> Vec<TimelineMessage> {
        self.state.lock().timeline.to_vec()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    /// The open conversation stream, if any.
    #[must_use]
    pub fn conversation(&self) -> Option<ConversationKey> {
        self.state.lock().conversation.clone()
    }

    /// Whether older history remains beyond the loaded window.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    /// Conversation metadata, once loaded.
    #[must_use]
    pub fn context(&self) -> Option<ConversationContext> {
        self.state.lock().context.clone()
    }

    /// Current mute preference.
    #[must_use]
    pub fn muted(&self) -> bool {
        self.state.lock().muted
    }

    /// Current translation target, if enabled.
    #[must_use]
    pub fn translation(&self) -> Option<String> {
        self.state.lock().translation.clone()
    }

    // -- internals --

    /// Shared tail of open/switch: fetch context (if missing) and the
    /// first page concurrently, then apply everything under one lock.
    async fn run_initial_load(
        self: &Arc<Self>,
        conversation: ConversationKey,
        epoch: u64,
    ) -> Result<(), SyncError> {
        self.spawn_preferences_fetch(conversation.clone(), epoch);

        let page_request = PageRequest {
            before: None,
            limit: self.config.page_size,
        };
        let need_context = self.state.lock().context.is_none();
        let (context, page) = if need_context {
            let (context, page) = tokio::join!(
                self.api.fetch_context(&conversation),
                self.api.fetch_messages(&conversation, page_request)
            );
            let context = match context {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(error = %e, "context fetch failed");
                    None
                }
            };
            (context, page)
        } else {
            (None, self.api.fetch_messages(&conversation, page_request).await)
        };

        let page = match page {
            Ok(page) => page,
            Err(e) => {
                let mut state = self.state.lock();
                if state.epoch == epoch {
                    state.phase = SessionPhase::Ready;
                }
                return Err(SyncError::HistoryFetchFailed(e));
            }
        };

        let queued = match self.store.load_queue(&conversation).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "queue load failed; nothing to resurface");
                Vec::new()
            }
        };

        let (purged, to_send, outcomes) = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                tracing::debug!(conversation = %conversation, "discarding stale load result");
                return Ok(());
            }
            if let Some(context) = context {
                state.context = Some(context);
            }
            state.has_more = page.len() == self.config.page_size;
            state.timeline.reset(page);
            let (purged, to_send) =
                outbox::resurface_queue(&mut state, queued, &self.user_id);
            let outcomes = reconcile::drain_missed(&mut state, &self.user_id);
            state.phase = SessionPhase::Ready;
            (purged, to_send, outcomes)
        };
        self.emit(SessionEvent::TimelineReset);

        for temp_id in purged {
            if let Err(e) = self.store.remove_queue_entry(&temp_id, &conversation).await {
                tracing::warn!(error = %e, temp_id = %temp_id, "queue purge failed");
            }
        }
        for entry in to_send {
            // An attempt spawned before this load may still be running;
            // starting another would double-send.
            if self.sends.lock().contains_key(&entry.temp_id) {
                continue;
            }
            self.start_send(entry);
        }
        for outcome in outcomes {
            self.apply_reconcile_followup(outcome).await;
        }

        let newest = self.state.lock().timeline.newest_confirmed_id().cloned();
        if let Some(id) = newest {
            self.persist_last_read(&conversation, &id).await;
        }

        self.spawn_pinned_refresh();
        Ok(())
    }

    /// Buffer or reconcile one authoritative message for the current
    /// stream, then run the storage follow-ups.
    pub(crate) async fn ingest_message(&self, message: clubchat_proto::message::ChatMessage) {
        let outcome = {
            let mut state = self.state.lock();
            if state.conversation.as_ref() != Some(&message.conversation) {
                tracing::debug!(message_id = %message.id, "message outside the open stream dropped");
                return;
            }
            match state.phase {
                SessionPhase::Loading | SessionPhase::SwitchingSubChannel => {
                    state.missed.push(message);
                    None
                }
                SessionPhase::Ready if state.loading_more => {
                    state.missed.push(message);
                    None
                }
                SessionPhase::Ready => Some(reconcile::reconcile(
                    &mut state.timeline,
                    message,
                    &self.user_id,
                )),
                SessionPhase::Idle | SessionPhase::Closed => None,
            }
        };
        if let Some(outcome) = outcome {
            self.apply_reconcile_followup(outcome).await;
        }
    }

    /// Emit events and perform the async bookkeeping a reconcile
    /// outcome requires (queue removal, send-task cancellation, read
    /// marker update).
    pub(crate) async fn apply_reconcile_followup(&self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Duplicate => {}
            ReconcileOutcome::Appended(message_id) => {
                self.emit(SessionEvent::MessageAppended {
                    message_id: message_id.clone(),
                });
                if let Some(conversation) = self.conversation() {
                    self.persist_last_read(&conversation, &message_id).await;
                }
            }
            ReconcileOutcome::Replaced {
                temp_id,
                message_id,
            } => {
                self.emit(SessionEvent::MessageReplaced {
                    temp_id: temp_id.clone(),
                    message_id: message_id.clone(),
                });
                self.cancel_send_task(&temp_id);
                if let Some(conversation) = self.conversation() {
                    if let Err(e) = self.store.remove_queue_entry(&temp_id, &conversation).await {
                        tracing::warn!(error = %e, temp_id = %temp_id, "queue removal failed");
                    }
                    self.persist_last_read(&conversation, &message_id).await;
                }
            }
        }
    }

    /// Targeted re-sync: ask the server for everything newer than the
    /// newest loaded message and merge it through reconciliation.
    async fn resync(&self) {
        let target = {
            let state = self.state.lock();
            state
                .conversation
                .clone()
                .zip(state.timeline.newest_confirmed_id().cloned())
        };
        let Some((conversation, newest)) = target else {
            return;
        };
        match self.api.sync_since(&conversation, &newest).await {
            Ok(missed) => {
                if !missed.is_empty() {
                    tracing::info!(count = missed.len(), "applying targeted re-sync");
                }
                for message in missed {
                    self.ingest_message(message).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "targeted re-sync failed");
                self.emit(SessionEvent::Error(format!("re-sync failed: {e}")));
            }
        }
    }

    /// Fetch mute/translation preferences without blocking the load.
    fn spawn_preferences_fetch(self: &Arc<Self>, conversation: ConversationKey, epoch: u64) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            match session.api.fetch_preferences(&conversation).await {
                Ok(preferences) => {
                    let mut state = session.state.lock();
                    if state.epoch == epoch {
                        state.muted = preferences.muted;
                        state.translation = preferences.translation;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "preferences fetch failed"),
            }
        });
    }

    pub(crate) fn is_current(&self, conversation: &ConversationKey) -> bool {
        self.state.lock().conversation.as_ref() == Some(conversation)
    }

    /// Persist the newest-seen marker; failures are logged, never fatal.
    pub(crate) async fn persist_last_read(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
    ) {
        if let Err(e) = self.store.set_last_read(conversation, message_id).await {
            tracing::warn!(error = %e, "read marker persist failed");
        }
    }

    /// Abort and forget the in-flight send task for a temp id, if any.
    pub(crate) fn cancel_send_task(&self, temp_id: &TempId) {
        if let Some(handle) = self.sends.lock().remove(temp_id) {
            handle.abort();
        }
    }

    /// Best-effort event emission; a full or closed receiver drops the
    /// notification, never blocks the engine.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.event_tx.try_send(event).is_err() {
            tracing::debug!("session event dropped (receiver full or gone)");
        }
    }
}
