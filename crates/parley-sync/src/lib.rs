// Message synchronization engine: keeps the local conversation view
// consistent with the remote chat service across optimistic mutations,
// request/response results, and out-of-band push events.

pub mod client;
pub mod engine;
pub mod error;
pub mod merge;
pub mod processor;
pub mod queue;
pub mod state;

pub use client::{spawn_client, ChatHandle, ClientCommand, ClientConfig};
pub use engine::{SendOutcome, SyncEngine};
pub use error::{Result, SyncError};
pub use merge::{apply_event, MergeOutcome, MessageRouting};
pub use processor::EventProcessor;
pub use queue::{OfflineQueue, QueueEntry};
pub use state::{lock_state, ChatState, SharedState};
