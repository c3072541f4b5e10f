//! Message synchronization engine.
//!
//! Owns every mutation of the conversation view: optimistic sends with
//! reconciliation, server-first edits and deletes, cursor pagination, and
//! draining of the offline queue. All operations take `&self` so one engine
//! instance can be shared between the host application and the client event
//! loop; no lock is ever held across an await point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use parley_net::Transport;
use parley_shared::model::{Conversation, Message, MessageDraft};
use parley_shared::notify::{NoticeKind, Notifier};
use parley_shared::types::{ConnectionInfo, ConversationId, MessageId, PaginationState, UserId};

use crate::error::{Result, SyncError};
use crate::queue::OfflineQueue;
use crate::state::{lock_state, ChatState, SharedState};

/// What happened to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Confirmed by the server under this id; the optimistic placeholder was
    /// replaced.
    Sent(MessageId),
    /// The send failed while disconnected; the placeholder stays pending and
    /// the payload waits in the offline queue.
    Queued,
}

pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    state: SharedState,
    connection: Arc<Mutex<ConnectionInfo>>,
    queue: Mutex<OfflineQueue>,
    notifier: Arc<dyn Notifier>,
    local_user: UserId,
    temp_seq: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        state: SharedState,
        connection: Arc<Mutex<ConnectionInfo>>,
        notifier: Arc<dyn Notifier>,
        local_user: UserId,
    ) -> Self {
        Self {
            transport,
            state,
            connection,
            queue: Mutex::new(OfflineQueue::new()),
            notifier,
            local_user,
            temp_seq: AtomicU64::new(1),
        }
    }

    pub fn state_handle(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn queue_len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        lock_state(&self.state).active_id().cloned()
    }

    fn lock_queue(&self) -> MutexGuard<'_, OfflineQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_connected()
    }

    fn next_temp_id(&self) -> MessageId {
        MessageId::temp(self.temp_seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Make `conversation` the active one, discarding the previous view.
    pub fn select_conversation(&self, conversation: Option<Conversation>) {
        lock_state(&self.state).select_conversation(conversation);
    }

    /// Load message history for the active conversation.
    ///
    /// `append = false` resets the list and fetches the newest page;
    /// `append = true` fetches the page at the stored cursor and prepends
    /// the older messages. A response arriving after the conversation
    /// changed is dropped, matched on the conversation id captured here.
    pub async fn load_messages(&self, append: bool) -> Result<()> {
        let (conversation_id, cursor) = {
            let mut state = lock_state(&self.state);
            let Some(id) = state.active_id().cloned() else {
                return Err(SyncError::NoActiveConversation);
            };

            if append {
                if state.pagination.is_loading_more || !state.pagination.has_more {
                    return Ok(());
                }
                state.pagination.is_loading_more = true;
                (id, state.pagination.next_cursor.clone())
            } else {
                state.messages.clear();
                state.pagination = PaginationState::default();
                state.is_loading = true;
                (id, None)
            }
        };

        let result = self
            .transport
            .fetch_messages(&conversation_id, cursor.as_deref())
            .await;

        let mut state = lock_state(&self.state);
        if state.active_id() != Some(&conversation_id) {
            debug!(
                conversation = %conversation_id,
                "Dropping history page for a no longer selected conversation"
            );
            return Ok(());
        }

        match result {
            Ok(page) => {
                if append {
                    // Older messages go in front, preserving chronological
                    // order across the whole list.
                    let mut merged = page.messages;
                    merged.append(&mut state.messages);
                    state.messages = merged;
                } else {
                    state.messages = page.messages;
                    state.is_loading = false;
                }
                state.pagination = PaginationState {
                    has_more: page.has_more,
                    next_cursor: page.next_cursor,
                    is_loading_more: false,
                };
                Ok(())
            }
            Err(err) => {
                // Never leave a stuck loading flag behind.
                state.pagination.is_loading_more = false;
                state.is_loading = false;
                drop(state);
                self.notifier
                    .notify(NoticeKind::Error, "Failed to fetch messages");
                Err(SyncError::Fetch(err))
            }
        }
    }

    /// Send a message to the active conversation with an optimistic
    /// placeholder.
    pub async fn send_message(&self, draft: MessageDraft) -> Result<SendOutcome> {
        let temp_id = self.next_temp_id();

        let conversation_id = {
            let mut state = lock_state(&self.state);
            let Some(id) = state.active_id().cloned() else {
                return Err(SyncError::NoActiveConversation);
            };
            // Exactly one placeholder per call, inserted before the request
            // goes out.
            state.messages.push(Message::optimistic(
                temp_id.clone(),
                id.clone(),
                self.local_user.clone(),
                &draft,
            ));
            id
        };

        match self.transport.create_message(&conversation_id, &draft).await {
            Ok(confirmed) => {
                let confirmed_id = confirmed.id.clone();
                let mut state = lock_state(&self.state);
                if state.message(&confirmed_id).is_some() {
                    // The push echo of this send landed while the request
                    // was in flight; the confirmed message is already in
                    // the list, so only the placeholder goes.
                    state.remove_message(&temp_id);
                    debug!(msg_id = %confirmed_id, "Push echo arrived first, placeholder dropped");
                } else if !state.replace_message(&temp_id, confirmed) {
                    // Keyed by the temporary token, never by position: the
                    // list may have been reordered or extended while in
                    // flight.
                    debug!(
                        temp_id = %temp_id,
                        "Placeholder vanished before reconciliation (conversation switched)"
                    );
                }
                info!(msg_id = %confirmed_id, conversation = %conversation_id, "Message sent");
                Ok(SendOutcome::Sent(confirmed_id))
            }
            Err(err) => {
                if self.is_connected() {
                    lock_state(&self.state).remove_message(&temp_id);
                    self.notifier
                        .notify(NoticeKind::Error, "Failed to send message");
                    Err(SyncError::Send(err))
                } else {
                    // Keep the pending placeholder visible and hand the
                    // payload to the offline queue.
                    warn!(temp_id = %temp_id, error = %err, "Send failed while offline, queueing");
                    self.lock_queue()
                        .enqueue(conversation_id, temp_id, draft);
                    self.notifier.notify(
                        NoticeKind::Info,
                        "Message queued. It will be sent when the connection is restored.",
                    );
                    Ok(SendOutcome::Queued)
                }
            }
        }
    }

    /// Edit a message's text. Server-first: the local view changes only
    /// after the server confirms.
    pub async fn edit_message(&self, id: &MessageId, text: &str) -> Result<()> {
        match self.transport.edit_message(id, text).await {
            Ok(updated) => {
                lock_state(&self.state).replace_message(id, updated);
                self.notifier.notify(NoticeKind::Success, "Message edited");
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify(NoticeKind::Error, "Failed to edit message");
                Err(SyncError::Send(err))
            }
        }
    }

    /// Delete a message. Server-first, like [`Self::edit_message`].
    pub async fn delete_message(&self, id: &MessageId) -> Result<()> {
        match self.transport.delete_message(id).await {
            Ok(()) => {
                lock_state(&self.state).remove_message(id);
                self.notifier.notify(NoticeKind::Success, "Message deleted");
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify(NoticeKind::Error, "Failed to delete message");
                Err(SyncError::Send(err))
            }
        }
    }

    /// Add a reaction. The local view updates when the server pushes the
    /// resulting `reactionAdded` event back.
    pub async fn add_reaction(&self, id: &MessageId, emoji: &str) -> Result<()> {
        self.transport.add_reaction(id, emoji).await.map_err(|err| {
            self.notifier
                .notify(NoticeKind::Error, "Failed to add reaction");
            SyncError::Send(err)
        })
    }

    pub async fn remove_reaction(&self, id: &MessageId, emoji: &str) -> Result<()> {
        self.transport
            .remove_reaction(id, emoji)
            .await
            .map_err(|err| {
                self.notifier
                    .notify(NoticeKind::Error, "Failed to remove reaction");
                SyncError::Send(err)
            })
    }

    /// Record a read receipt. Fire-and-forget: failures are logged, never
    /// surfaced.
    pub async fn mark_read(&self, id: &MessageId) {
        if id.is_temp() {
            return;
        }
        if let Err(err) = self.transport.mark_read(id).await {
            debug!(msg_id = %id, error = %err, "Failed to mark message as read");
        }
    }

    /// Send queued messages in enqueue order, one at a time.
    ///
    /// Called once per transition into the connected state. On the first
    /// failure the failed entry goes back to the head and the rest stay
    /// queued for the next connection.
    pub async fn drain_queue(&self) {
        let total = self.lock_queue().len();
        if total == 0 {
            return;
        }
        info!(len = total, "Draining offline queue");

        loop {
            let Some(entry) = self.lock_queue().pop() else {
                break;
            };

            match self
                .transport
                .create_message(&entry.conversation_id, &entry.draft)
                .await
            {
                Ok(confirmed) => {
                    let confirmed_id = confirmed.id.clone();
                    let mut state = lock_state(&self.state);
                    if state.active_id() == Some(&entry.conversation_id) {
                        if state.message(&confirmed_id).is_some() {
                            // Echo beat the response; see send_message.
                            state.remove_message(&entry.temp_id);
                        } else {
                            state.replace_message(&entry.temp_id, confirmed);
                        }
                    }
                    info!(msg_id = %confirmed_id, "Queued message delivered");
                }
                Err(err) => {
                    warn!(
                        temp_id = %entry.temp_id,
                        error = %err,
                        "Queue drain interrupted, keeping remaining entries"
                    );
                    self.lock_queue().requeue_front(entry);
                    break;
                }
            }
        }
    }
}
