//! Push-channel event definitions.
//!
//! [`PushEvent`] covers both channel lifecycle notifications and the domain
//! events the server pushes out of band. The serde tagging matches a JSON
//! frame layout of `{"event": "...", "payload": {...}}` so a websocket
//! adapter can deserialize frames directly into the enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Message;
use crate::types::{ConversationId, MessageId, UserId};

/// Why the push channel disconnected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
    /// The client asked for the disconnect; never triggers auto-reconnect.
    Manual,
    /// The transport dropped the connection (reason string from the server).
    Transport(String),
}

/// Delivery acknowledgement level carried by a status update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Delivered,
    Read,
}

/// An event received from the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum PushEvent {
    // -- Channel lifecycle --
    Connected,
    Disconnected {
        reason: DisconnectReason,
    },
    ConnectError {
        message: String,
    },

    // -- Conversation events --
    NewMessage(Message),
    UserTyping {
        conversation_id: ConversationId,
        user_id: UserId,
        user_name: String,
    },
    UserStoppedTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    MessageStatusUpdate {
        message_id: MessageId,
        status: ReceiptStatus,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
    ReactionAdded {
        message_id: MessageId,
        emoji: String,
        user_id: UserId,
    },
    ReactionRemoved {
        message_id: MessageId,
        emoji: String,
        user_id: UserId,
    },
    MessageEdited(Message),
    MessageDeleted {
        message_id: MessageId,
    },
}

/// Discriminant of [`PushEvent`], used as a subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    Connected,
    Disconnected,
    ConnectError,
    NewMessage,
    UserTyping,
    UserStoppedTyping,
    MessageStatusUpdate,
    ReactionAdded,
    ReactionRemoved,
    MessageEdited,
    MessageDeleted,
}

impl PushEventKind {
    /// The conversation-scoped events the processor subscribes to while a
    /// conversation is active. Lifecycle events are excluded: those belong
    /// to the connection manager and are always handled.
    pub const CONVERSATION_EVENTS: [PushEventKind; 8] = [
        PushEventKind::NewMessage,
        PushEventKind::UserTyping,
        PushEventKind::UserStoppedTyping,
        PushEventKind::MessageStatusUpdate,
        PushEventKind::ReactionAdded,
        PushEventKind::ReactionRemoved,
        PushEventKind::MessageEdited,
        PushEventKind::MessageDeleted,
    ];
}

impl PushEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::Connected => PushEventKind::Connected,
            PushEvent::Disconnected { .. } => PushEventKind::Disconnected,
            PushEvent::ConnectError { .. } => PushEventKind::ConnectError,
            PushEvent::NewMessage(_) => PushEventKind::NewMessage,
            PushEvent::UserTyping { .. } => PushEventKind::UserTyping,
            PushEvent::UserStoppedTyping { .. } => PushEventKind::UserStoppedTyping,
            PushEvent::MessageStatusUpdate { .. } => PushEventKind::MessageStatusUpdate,
            PushEvent::ReactionAdded { .. } => PushEventKind::ReactionAdded,
            PushEvent::ReactionRemoved { .. } => PushEventKind::ReactionRemoved,
            PushEvent::MessageEdited(_) => PushEventKind::MessageEdited,
            PushEvent::MessageDeleted { .. } => PushEventKind::MessageDeleted,
        }
    }

    /// Whether this is a channel lifecycle event rather than conversation
    /// content.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind(),
            PushEventKind::Connected | PushEventKind::Disconnected | PushEventKind::ConnectError
        )
    }
}

/// An event emitted by the client over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
        user_name: String,
    },
    StopTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
}
