//! Domain model structs mirroring the chat service's wire format.
//!
//! Field names serialize in camelCase to match the server's JSON. The
//! `is_optimistic` flag is client-only and never crosses the wire.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Receipts and reactions
// ---------------------------------------------------------------------------

/// One delivery or read acknowledgement from a recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub user_id: UserId,
    pub at: DateTime<Utc>,
}

/// An emoji reaction on a message.
///
/// The reacting users form a set; the displayed count is always derived from
/// its cardinality and is never stored separately, so the two cannot drift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub users: BTreeSet<UserId>,
}

impl Reaction {
    pub fn new(emoji: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            users: BTreeSet::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message as held in the local conversation view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id, or a `temp-<n>` token while optimistic.
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Set on direct (non-group) messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Opaque reference to an uploaded attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Append-only per-recipient delivery log.
    #[serde(default)]
    pub delivered_to: Vec<Receipt>,
    /// Append-only per-recipient read log.
    #[serde(default)]
    pub read_by: Vec<Receipt>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// True while this message awaits server confirmation. Client-only.
    #[serde(skip)]
    pub is_optimistic: bool,
}

impl Message {
    /// Build the optimistic placeholder inserted before the server confirms
    /// a send.
    pub fn optimistic(
        temp_id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        draft: &MessageDraft,
    ) -> Self {
        Self {
            id: temp_id,
            conversation_id,
            sender_id,
            receiver_id: None,
            text: draft.text.clone(),
            attachment: draft.attachment.clone(),
            created_at: Utc::now(),
            edited_at: None,
            delivered_to: Vec::new(),
            read_by: Vec::new(),
            reactions: Vec::new(),
            is_optimistic: true,
        }
    }

    /// Look up the reaction entry for an emoji, if present.
    pub fn reaction(&self, emoji: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.emoji == emoji)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation (direct or group chat).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub is_group: bool,
}

impl Conversation {
    pub fn direct(id: impl Into<String>, participants: Vec<UserId>) -> Self {
        Self {
            id: ConversationId::new(id),
            participants,
            is_group: false,
        }
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.iter().any(|p| p == user)
    }
}

// ---------------------------------------------------------------------------
// Outgoing drafts and fetched pages
// ---------------------------------------------------------------------------

/// Payload for an outgoing message: text and/or an attachment reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
        }
    }
}

/// One page of message history, ordered oldest-first within the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}
