//! Realtime event processor.
//!
//! Holds the subscription registry for conversation-scoped push events and
//! routes subscribed events through the pure merge layer. Subscribing always
//! clears previous registrations first, so rapid conversation switches can
//! never stack handlers or leave stale ones behind.

use std::collections::HashSet;

use tracing::debug;

use parley_shared::events::{PushEvent, PushEventKind};
use parley_shared::types::UserId;

use crate::merge::{apply_event, MergeOutcome, MessageRouting};
use crate::state::ChatState;

pub struct EventProcessor {
    local_user: UserId,
    routing: MessageRouting,
    subscribed: HashSet<PushEventKind>,
}

impl EventProcessor {
    pub fn new(local_user: UserId, routing: MessageRouting) -> Self {
        Self {
            local_user,
            routing,
            subscribed: HashSet::new(),
        }
    }

    /// Register for all conversation events. Clears prior registrations
    /// first: subscribe/unsubscribe pairs stay idempotent no matter how
    /// often the active conversation changes.
    pub fn subscribe(&mut self) {
        self.unsubscribe();
        self.subscribed.extend(PushEventKind::CONVERSATION_EVENTS);
        debug!(events = self.subscribed.len(), "Subscribed to push events");
    }

    pub fn unsubscribe(&mut self) {
        self.subscribed.clear();
    }

    pub fn is_subscribed(&self) -> bool {
        !self.subscribed.is_empty()
    }

    /// Apply one push event to the state if its kind is subscribed.
    ///
    /// Lifecycle events are never handled here; the connection manager owns
    /// them.
    pub fn dispatch(&self, state: &mut ChatState, event: &PushEvent) -> MergeOutcome {
        if event.is_lifecycle() {
            return MergeOutcome::Ignored;
        }
        if !self.subscribed.contains(&event.kind()) {
            debug!(kind = ?event.kind(), "Unsubscribed push event dropped");
            return MergeOutcome::Ignored;
        }
        apply_event(state, event, &self.local_user, self.routing)
    }
}
