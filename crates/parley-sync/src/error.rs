use thiserror::Error;

use parley_net::NetError;

/// Errors surfaced by the synchronization engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Loading a history page failed. Not retried automatically.
    #[error("Failed to load messages: {0}")]
    Fetch(#[source] NetError),

    /// A create/edit/delete failed while online; optimistic state was
    /// rolled back.
    #[error("Failed to send: {0}")]
    Send(#[source] NetError),

    /// An operation that needs a selected conversation was called without
    /// one.
    #[error("No active conversation")]
    NoActiveConversation,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
