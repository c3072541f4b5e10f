// Shared domain types and event definitions for the Parley sync engine.

pub mod constants;
pub mod events;
pub mod model;
pub mod notify;
pub mod types;

pub use events::{ClientEvent, DisconnectReason, PushEvent, PushEventKind, ReceiptStatus};
pub use model::{Conversation, Message, MessageDraft, MessagePage, Reaction, Receipt};
pub use notify::{LogNotifier, NoticeKind, Notifier};
pub use types::{
    ConnectionInfo, ConnectionState, ConversationId, MessageId, PaginationState, TypingUser,
    UserId,
};
