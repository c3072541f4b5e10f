use serde::{Deserialize, Serialize};

use crate::constants::TEMP_ID_PREFIX;

// Identifiers are server-assigned opaque strings. Messages additionally use
// locally-generated temporary tokens until the server confirms them.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a temporary token from a monotonic sequence number.
    pub fn temp(seq: u64) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{seq}"))
    }

    /// Whether this id is a local placeholder awaiting server confirmation.
    pub fn is_temp(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle state of the push channel.
///
/// Owned exclusively by the connection manager; every other component reads
/// it through a shared [`ConnectionInfo`] handle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Snapshot of the connection manager's state for dependents and the UI.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// Delay (milliseconds) of the most recently scheduled reconnection.
    pub current_delay_ms: u64,
}

impl ConnectionInfo {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            current_delay_ms: 0,
        }
    }
}

/// A participant currently typing in the active conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: UserId,
    pub user_name: String,
}

/// Cursor-based pagination state for the active conversation's history.
///
/// Reset whenever the active conversation changes; mutated only by the
/// synchronization engine's fetch completion paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub is_loading_more: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            has_more: true,
            next_cursor: None,
            is_loading_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_id_prefix() {
        let id = MessageId::temp(7);
        assert_eq!(id.as_str(), "temp-7");
        assert!(id.is_temp());
        assert!(!MessageId::new("64f1a2").is_temp());
    }

    #[test]
    fn test_pagination_reset_state() {
        let p = PaginationState::default();
        assert!(p.has_more);
        assert!(p.next_cursor.is_none());
        assert!(!p.is_loading_more);
    }

    #[test]
    fn test_id_serde_transparent() {
        let id: MessageId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id, MessageId::new("abc"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
