//! Paginated history loading.
//!
//! Pages are fetched backward from the oldest loaded message and spliced
//! in front of the window; a page shorter than the configured size means
//! the top of history was reached. `load_until` powers jump-to-pinned
//! and jump-to-reply: it keeps paging until the target id surfaces or a
//! bounded number of pages is exhausted.

use std::sync::Arc;

use clubchat_proto::message::MessageId;

use crate::api::{ChatApi, PageRequest};
use crate::storage::LocalStore;

use super::{ChatSession, SessionEvent, SessionPhase, SyncError, reconcile};

impl<A, Q> ChatSession<A, Q>
where
    A: ChatApi + 'static,
    Q: LocalStore + 'static,
{
    /// Load one page of older history.
    ///
    /// Returns the number of messages spliced in (0 when there is
    /// nothing left, a load is already running, or the session moved on
    /// mid-fetch).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::HistoryFetchFailed`] on a transient fetch
    /// error; already-loaded pages are untouched and the caller may
    /// retry.
    pub async fn load_more(self: &Arc<Self>) -> Result<usize, SyncError> {
        Ok(self.fetch_older_page().await?.unwrap_or(0))
    }

    /// Page backward until `target` is in the loaded window.
    ///
    /// Bounded by `jump_search_max_pages`; returns `false` when the
    /// bound or the top of history is reached without finding the
    /// target (deleted, or in another sub-channel).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::HistoryFetchFailed`] if a page fetch fails.
    pub async fn load_until(self: &Arc<Self>, target: &MessageId) -> Result<bool, SyncError> {
        if self.state.lock().timeline.contains_id(target) {
            return Ok(true);
        }
        for _ in 0..self.config.jump_search_max_pages {
            let fetched = self.fetch_older_page().await?;
            let (found, has_more) = {
                let state = self.state.lock();
                (state.timeline.contains_id(target), state.has_more)
            };
            if found {
                return Ok(true);
            }
            if !has_more || fetched.is_none() {
                return Ok(false);
            }
        }
        tracing::info!(target = %target, "jump target not found within page bound");
        Ok(false)
    }

    /// Jump to a message, paging history in if needed.
    ///
    /// Emits [`SessionEvent::ScrollTo`] on success.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TargetNotFound`] if the message is not
    /// reachable within the search bound, or a history fetch error.
    pub async fn jump_to(self: &Arc<Self>, target: &MessageId) -> Result<(), SyncError> {
        if self.load_until(target).await? {
            self.emit(SessionEvent::ScrollTo {
                message_id: target.clone(),
            });
            Ok(())
        } else {
            Err(SyncError::TargetNotFound)
        }
    }

    /// One guarded backward page fetch.
    ///
    /// `Ok(None)` means the fetch did not run: nothing older, a fetch
    /// already in flight (re-entrancy guard), or the session switched
    /// context before the result landed.
    async fn fetch_older_page(self: &Arc<Self>) -> Result<Option<usize>, SyncError> {
        let (conversation, before, epoch) = {
            let mut state = self.state.lock();
            let Some(conversation) = state.conversation.clone() else {
                return Err(SyncError::NoActiveConversation);
            };
            if state.phase != SessionPhase::Ready || !state.has_more || state.loading_more {
                return Ok(None);
            }
            state.loading_more = true;
            (
                conversation,
                state.timeline.oldest_confirmed_id().cloned(),
                state.epoch,
            )
        };

        let result = self
            .api
            .fetch_messages(
                &conversation,
                PageRequest {
                    before,
                    limit: self.config.page_size,
                },
            )
            .await;

        let (added, outcomes) = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                tracing::debug!("discarding stale older-page result");
                return Ok(None);
            }
            state.loading_more = false;
            let page = match result {
                Ok(page) => page,
                Err(e) => return Err(SyncError::HistoryFetchFailed(e)),
            };
            state.has_more = page.len() == self.config.page_size;
            let added = state.timeline.prepend_page(page);
            // Anything that arrived over the stream during the fetch was
            // parked; merge it now that the splice is done.
            let outcomes = reconcile::drain_missed(&mut state, &self.user_id);
            (added, outcomes)
        };

        if added > 0 {
            self.emit(SessionEvent::HistoryPrepended { count: added });
        }
        for outcome in outcomes {
            self.apply_reconcile_followup(outcome).await;
        }
        Ok(Some(added))
    }
}
