//! Pure merge operations for push events.
//!
//! Every merge is a function of (current state, event) keyed by message or
//! user id. Affected messages are rebuilt rather than mutated through shared
//! aliases, and an event referencing a message that is no longer loaded
//! (scrolled out of the window) is dropped silently.

use tracing::debug;

use parley_shared::events::{PushEvent, ReceiptStatus};
use parley_shared::model::{Message, Reaction, Receipt};
use parley_shared::types::{MessageId, TypingUser, UserId};

use crate::state::ChatState;

/// How a `NewMessage` event is matched against the active conversation.
///
/// The strict mode only accepts an exact conversation-id match. The
/// participant mode additionally accepts messages whose sender or receiver
/// is the remote participant of the active direct conversation, for
/// contact-style backends that omit the conversation id on direct pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRouting {
    ConversationOnly,
    DirectParticipant,
}

/// Result of dispatching one push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// Dropped: not subscribed, not for the active conversation, or the
    /// referenced message is not loaded.
    Ignored,
    /// Applied, and the caller should request a read receipt for this
    /// message (it arrived from another user while visible).
    NeedsReadReceipt(MessageId),
}

/// Apply one push event to the conversation state.
pub fn apply_event(
    state: &mut ChatState,
    event: &PushEvent,
    local_user: &UserId,
    routing: MessageRouting,
) -> MergeOutcome {
    match event {
        PushEvent::NewMessage(message) => merge_new_message(state, message, local_user, routing),

        PushEvent::UserTyping {
            conversation_id,
            user_id,
            user_name,
        } => {
            if state.active_id() != Some(conversation_id) {
                return MergeOutcome::Ignored;
            }
            // Set semantics: re-adding an already-typing user is a no-op.
            if state.typing.iter().any(|t| &t.user_id == user_id) {
                return MergeOutcome::Ignored;
            }
            state.typing.push(TypingUser {
                user_id: user_id.clone(),
                user_name: user_name.clone(),
            });
            MergeOutcome::Applied
        }

        PushEvent::UserStoppedTyping {
            conversation_id,
            user_id,
        } => {
            if state.active_id() != Some(conversation_id) {
                return MergeOutcome::Ignored;
            }
            let before = state.typing.len();
            state.typing.retain(|t| &t.user_id != user_id);
            if state.typing.len() == before {
                MergeOutcome::Ignored
            } else {
                MergeOutcome::Applied
            }
        }

        PushEvent::MessageStatusUpdate {
            message_id,
            status,
            user_id,
            timestamp,
        } => rebuild_message(state, message_id, |message| {
            let mut updated = message.clone();
            let receipt = Receipt {
                user_id: user_id.clone(),
                at: *timestamp,
            };
            // Append-only receipt log; earlier entries are never overwritten.
            match status {
                ReceiptStatus::Delivered => updated.delivered_to.push(receipt),
                ReceiptStatus::Read => updated.read_by.push(receipt),
            }
            updated
        }),

        PushEvent::ReactionAdded {
            message_id,
            emoji,
            user_id,
        } => rebuild_message(state, message_id, |message| {
            with_reaction_added(message, emoji, user_id)
        }),

        PushEvent::ReactionRemoved {
            message_id,
            emoji,
            user_id,
        } => rebuild_message(state, message_id, |message| {
            with_reaction_removed(message, emoji, user_id)
        }),

        PushEvent::MessageEdited(edited) => {
            if state.replace_message(&edited.id, edited.clone()) {
                MergeOutcome::Applied
            } else {
                debug!(msg_id = %edited.id, "Edit for unloaded message dropped");
                MergeOutcome::Ignored
            }
        }

        PushEvent::MessageDeleted { message_id } => {
            if state.remove_message(message_id) {
                MergeOutcome::Applied
            } else {
                debug!(msg_id = %message_id, "Delete for unloaded message dropped");
                MergeOutcome::Ignored
            }
        }

        // Lifecycle events belong to the connection manager.
        PushEvent::Connected | PushEvent::Disconnected { .. } | PushEvent::ConnectError { .. } => {
            MergeOutcome::Ignored
        }
    }
}

fn merge_new_message(
    state: &mut ChatState,
    message: &Message,
    local_user: &UserId,
    routing: MessageRouting,
) -> MergeOutcome {
    if !routes_to_active(state, message, local_user, routing) {
        return MergeOutcome::Ignored;
    }

    // The same message can reach us twice (push echo of an own send that was
    // already reconciled); id-keyed insertion keeps the list duplicate-free.
    if state.message(&message.id).is_some() {
        debug!(msg_id = %message.id, "Duplicate newMessage dropped");
        return MergeOutcome::Ignored;
    }

    state.messages.push(message.clone());
    if &message.sender_id != local_user {
        MergeOutcome::NeedsReadReceipt(message.id.clone())
    } else {
        MergeOutcome::Applied
    }
}

fn routes_to_active(
    state: &ChatState,
    message: &Message,
    local_user: &UserId,
    routing: MessageRouting,
) -> bool {
    let Some(active) = &state.active else {
        return false;
    };

    if message.conversation_id == active.id {
        return true;
    }

    if routing == MessageRouting::DirectParticipant && !active.is_group {
        // Accept a message exchanged with the remote side of the active
        // direct conversation.
        let from_contact =
            &message.sender_id != local_user && active.has_participant(&message.sender_id);
        let to_contact = message
            .receiver_id
            .as_ref()
            .is_some_and(|r| r != local_user && active.has_participant(r));
        return from_contact || to_contact;
    }

    false
}

/// Replace the identified message by a rebuilt copy. Missing ids are dropped
/// silently: the message may simply have scrolled out of the loaded window.
fn rebuild_message<F>(state: &mut ChatState, id: &MessageId, rebuild: F) -> MergeOutcome
where
    F: FnOnce(&Message) -> Message,
{
    match state.message(id) {
        Some(message) => {
            let updated = rebuild(message);
            state.replace_message(id, updated);
            MergeOutcome::Applied
        }
        None => {
            debug!(msg_id = %id, "Event for unloaded message dropped");
            MergeOutcome::Ignored
        }
    }
}

/// Copy of `message` with `user_id` added to the emoji's reacting-user set.
fn with_reaction_added(message: &Message, emoji: &str, user_id: &UserId) -> Message {
    let mut updated = message.clone();
    match updated.reactions.iter_mut().find(|r| r.emoji == emoji) {
        Some(reaction) => {
            reaction.users.insert(user_id.clone());
        }
        None => {
            let mut reaction = Reaction::new(emoji);
            reaction.users.insert(user_id.clone());
            updated.reactions.push(reaction);
        }
    }
    updated
}

/// Copy of `message` with `user_id` removed from the emoji's set; an emoji
/// left with no users is pruned entirely.
fn with_reaction_removed(message: &Message, emoji: &str, user_id: &UserId) -> Message {
    let mut updated = message.clone();
    if let Some(reaction) = updated.reactions.iter_mut().find(|r| r.emoji == emoji) {
        reaction.users.remove(user_id);
    }
    updated.reactions.retain(|r| !r.is_empty());
    updated
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use parley_shared::model::Conversation;
    use parley_shared::types::ConversationId;

    use super::*;

    fn local() -> UserId {
        UserId::new("alice")
    }

    fn message(id: &str, sender: &str) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new("c1"),
            sender_id: UserId::new(sender),
            receiver_id: None,
            text: Some("hi".into()),
            attachment: None,
            created_at: Utc::now(),
            edited_at: None,
            delivered_to: Vec::new(),
            read_by: Vec::new(),
            reactions: Vec::new(),
            is_optimistic: false,
        }
    }

    fn state_with(messages: Vec<Message>) -> ChatState {
        let mut state = ChatState::new();
        state.active = Some(Conversation {
            id: ConversationId::new("c1"),
            participants: vec![local(), UserId::new("bob")],
            is_group: false,
        });
        state.messages = messages;
        state
    }

    fn reaction_added(msg: &str, emoji: &str, user: &str) -> PushEvent {
        PushEvent::ReactionAdded {
            message_id: MessageId::new(msg),
            emoji: emoji.into(),
            user_id: UserId::new(user),
        }
    }

    fn reaction_removed(msg: &str, emoji: &str, user: &str) -> PushEvent {
        PushEvent::ReactionRemoved {
            message_id: MessageId::new(msg),
            emoji: emoji.into(),
            user_id: UserId::new(user),
        }
    }

    fn apply(state: &mut ChatState, event: &PushEvent) -> MergeOutcome {
        apply_event(state, event, &local(), MessageRouting::ConversationOnly)
    }

    #[test]
    fn test_new_message_appends_and_requests_read_receipt() {
        let mut state = state_with(vec![]);
        let outcome = apply(&mut state, &PushEvent::NewMessage(message("m1", "bob")));
        assert_eq!(outcome, MergeOutcome::NeedsReadReceipt(MessageId::new("m1")));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_own_message_needs_no_receipt() {
        let mut state = state_with(vec![]);
        let outcome = apply(&mut state, &PushEvent::NewMessage(message("m1", "alice")));
        assert_eq!(outcome, MergeOutcome::Applied);
    }

    #[test]
    fn test_new_message_for_other_conversation_ignored() {
        let mut state = state_with(vec![]);
        let mut foreign = message("m1", "bob");
        foreign.conversation_id = ConversationId::new("c2");
        assert_eq!(
            apply(&mut state, &PushEvent::NewMessage(foreign)),
            MergeOutcome::Ignored
        );
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_direct_participant_routing() {
        let mut state = state_with(vec![]);
        let mut foreign = message("m1", "bob");
        foreign.conversation_id = ConversationId::new("unrelated");

        // Strict routing drops it; participant routing accepts it because
        // bob is the remote side of the active direct conversation.
        assert_eq!(
            apply_event(
                &mut state,
                &PushEvent::NewMessage(foreign.clone()),
                &local(),
                MessageRouting::ConversationOnly
            ),
            MergeOutcome::Ignored
        );
        assert_eq!(
            apply_event(
                &mut state,
                &PushEvent::NewMessage(foreign),
                &local(),
                MessageRouting::DirectParticipant
            ),
            MergeOutcome::NeedsReadReceipt(MessageId::new("m1"))
        );

        // An own message addressed to the contact routes the same way.
        let mut outbound = message("m2", "alice");
        outbound.conversation_id = ConversationId::new("unrelated");
        outbound.receiver_id = Some(UserId::new("bob"));
        assert_eq!(
            apply_event(
                &mut state,
                &PushEvent::NewMessage(outbound),
                &local(),
                MessageRouting::DirectParticipant
            ),
            MergeOutcome::Applied
        );

        // A stranger's message never routes in.
        let mut stranger = message("m3", "mallory");
        stranger.conversation_id = ConversationId::new("unrelated");
        assert_eq!(
            apply_event(
                &mut state,
                &PushEvent::NewMessage(stranger),
                &local(),
                MessageRouting::DirectParticipant
            ),
            MergeOutcome::Ignored
        );
    }

    #[test]
    fn test_duplicate_new_message_dropped() {
        let mut state = state_with(vec![message("m1", "bob")]);
        assert_eq!(
            apply(&mut state, &PushEvent::NewMessage(message("m1", "bob"))),
            MergeOutcome::Ignored
        );
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_typing_set_semantics() {
        let mut state = state_with(vec![]);
        let typing = PushEvent::UserTyping {
            conversation_id: ConversationId::new("c1"),
            user_id: UserId::new("bob"),
            user_name: "Bob".into(),
        };
        assert_eq!(apply(&mut state, &typing), MergeOutcome::Applied);
        // Duplicate delivery leaves a single entry.
        assert_eq!(apply(&mut state, &typing), MergeOutcome::Ignored);
        assert_eq!(state.typing.len(), 1);

        let stopped = PushEvent::UserStoppedTyping {
            conversation_id: ConversationId::new("c1"),
            user_id: UserId::new("bob"),
        };
        assert_eq!(apply(&mut state, &stopped), MergeOutcome::Applied);
        assert!(state.typing.is_empty());
        assert_eq!(apply(&mut state, &stopped), MergeOutcome::Ignored);
    }

    #[test]
    fn test_typing_for_other_conversation_ignored() {
        let mut state = state_with(vec![]);
        let typing = PushEvent::UserTyping {
            conversation_id: ConversationId::new("c9"),
            user_id: UserId::new("bob"),
            user_name: "Bob".into(),
        };
        assert_eq!(apply(&mut state, &typing), MergeOutcome::Ignored);
        assert!(state.typing.is_empty());
    }

    #[test]
    fn test_status_update_appends_receipts() {
        let mut state = state_with(vec![message("m1", "alice")]);
        let now = Utc::now();
        let delivered = PushEvent::MessageStatusUpdate {
            message_id: MessageId::new("m1"),
            status: ReceiptStatus::Delivered,
            user_id: UserId::new("bob"),
            timestamp: now,
        };
        apply(&mut state, &delivered);
        apply(&mut state, &delivered);

        // Append-only: a duplicate event adds a second entry rather than
        // overwriting the first.
        let msg = state.message(&MessageId::new("m1")).unwrap();
        assert_eq!(msg.delivered_to.len(), 2);
        assert!(msg.read_by.is_empty());

        apply(
            &mut state,
            &PushEvent::MessageStatusUpdate {
                message_id: MessageId::new("m1"),
                status: ReceiptStatus::Read,
                user_id: UserId::new("bob"),
                timestamp: now,
            },
        );
        let msg = state.message(&MessageId::new("m1")).unwrap();
        assert_eq!(msg.read_by.len(), 1);
        assert_eq!(msg.delivered_to.len(), 2);
    }

    #[test]
    fn test_reaction_count_tracks_user_set() {
        let mut state = state_with(vec![message("m1", "alice")]);

        apply(&mut state, &reaction_added("m1", "👍", "bob"));
        apply(&mut state, &reaction_added("m1", "👍", "carol"));
        // Duplicate delivery of the same event.
        apply(&mut state, &reaction_added("m1", "👍", "bob"));

        let msg = state.message(&MessageId::new("m1")).unwrap();
        let reaction = msg.reaction("👍").unwrap();
        assert_eq!(reaction.count(), 2);
        assert_eq!(reaction.count(), reaction.users.len());
    }

    #[test]
    fn test_empty_reaction_is_pruned() {
        let mut state = state_with(vec![message("m1", "alice")]);
        apply(&mut state, &reaction_added("m1", "🔥", "bob"));
        apply(&mut state, &reaction_removed("m1", "🔥", "bob"));

        let msg = state.message(&MessageId::new("m1")).unwrap();
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn test_out_of_order_reaction_removal() {
        let mut state = state_with(vec![message("m1", "alice")]);
        // Removal arriving before any add is a no-op.
        apply(&mut state, &reaction_removed("m1", "👍", "bob"));
        apply(&mut state, &reaction_added("m1", "👍", "bob"));

        let msg = state.message(&MessageId::new("m1")).unwrap();
        assert_eq!(msg.reaction("👍").unwrap().count(), 1);
    }

    #[test]
    fn test_events_for_unloaded_message_drop_silently() {
        let mut state = state_with(vec![]);
        let now = Utc::now();
        let events = [
            reaction_added("gone", "👍", "bob"),
            reaction_removed("gone", "👍", "bob"),
            PushEvent::MessageStatusUpdate {
                message_id: MessageId::new("gone"),
                status: ReceiptStatus::Read,
                user_id: UserId::new("bob"),
                timestamp: now,
            },
            PushEvent::MessageEdited(message("gone", "bob")),
            PushEvent::MessageDeleted {
                message_id: MessageId::new("gone"),
            },
        ];
        for event in &events {
            assert_eq!(apply(&mut state, event), MergeOutcome::Ignored);
        }
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_edit_replaces_whole_message() {
        let mut state = state_with(vec![message("m1", "bob")]);
        let mut edited = message("m1", "bob");
        edited.text = Some("new text".into());
        edited.edited_at = Some(Utc::now());

        assert_eq!(
            apply(&mut state, &PushEvent::MessageEdited(edited)),
            MergeOutcome::Applied
        );
        let msg = state.message(&MessageId::new("m1")).unwrap();
        assert_eq!(msg.text.as_deref(), Some("new text"));
        assert!(msg.edited_at.is_some());
    }

    #[test]
    fn test_delete_removes_by_id() {
        let mut state = state_with(vec![message("m1", "bob"), message("m2", "bob")]);
        apply(
            &mut state,
            &PushEvent::MessageDeleted {
                message_id: MessageId::new("m1"),
            },
        );
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].id, MessageId::new("m2"));
    }
}
