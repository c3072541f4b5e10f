//! Shared conversation state container.
//!
//! One [`ChatState`] instance holds everything the UI renders for the
//! currently selected conversation. It is wrapped in `Arc<Mutex<>>` and
//! shared between the host application and the client event loop; every
//! lookup and replacement is keyed by stable id, never by list position.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parley_shared::model::{Conversation, Message};
use parley_shared::types::{ConversationId, MessageId, PaginationState, TypingUser};

/// In-memory state for the active conversation.
///
/// Switching conversations discards the previous list: at most one
/// conversation's messages are held in memory at a time.
#[derive(Debug, Default)]
pub struct ChatState {
    pub active: Option<Conversation>,
    pub messages: Vec<Message>,
    pub typing: Vec<TypingUser>,
    pub pagination: PaginationState,
    pub is_loading: bool,
}

pub type SharedState = Arc<Mutex<ChatState>>;

/// Lock the shared state, recovering from a poisoned mutex.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|c| &c.id)
    }

    /// Make `conversation` active (or none), discarding the previous
    /// conversation's messages and typing set and resetting pagination.
    pub fn select_conversation(&mut self, conversation: Option<Conversation>) {
        self.active = conversation;
        self.messages.clear();
        self.typing.clear();
        self.pagination = PaginationState::default();
        self.is_loading = false;
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    /// Replace the message with id `id` by `replacement`, keyed by id (the
    /// list may have been reordered or grown since the caller last saw it).
    /// Returns false if no such message is loaded.
    pub fn replace_message(&mut self, id: &MessageId, replacement: Message) -> bool {
        match self.message_mut(id) {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        }
    }

    /// Remove the message with id `id`. Returns false if it was not loaded.
    pub fn remove_message(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        self.messages.len() != before
    }

    /// Count of optimistic placeholders still awaiting confirmation.
    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_optimistic).count()
    }
}
