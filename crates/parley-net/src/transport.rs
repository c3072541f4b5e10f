//! Request/response transport to the chat service.
//!
//! The engine only ever talks to the [`Transport`] trait; [`HttpTransport`]
//! is the production implementation over reqwest. Tests substitute their own
//! mock.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use parley_shared::constants::DEFAULT_PAGE_SIZE;
use parley_shared::model::{Message, MessageDraft, MessagePage};
use parley_shared::types::{ConversationId, MessageId};

use crate::error::{NetError, Result};

/// Typed request/response operations against the chat service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one page of history, newest page first, oldest-first inside the
    /// page. `cursor = None` requests the most recent page.
    async fn fetch_messages(
        &self,
        conversation: &ConversationId,
        cursor: Option<&str>,
    ) -> Result<MessagePage>;

    /// Create a message; returns the server-confirmed message.
    async fn create_message(
        &self,
        conversation: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<Message>;

    /// Replace a message's text; returns the updated message.
    async fn edit_message(&self, id: &MessageId, text: &str) -> Result<Message>;

    async fn delete_message(&self, id: &MessageId) -> Result<()>;

    async fn add_reaction(&self, id: &MessageId, emoji: &str) -> Result<()>;

    async fn remove_reaction(&self, id: &MessageId, emoji: &str) -> Result<()>;

    /// Record a read receipt for a message the local user has seen.
    async fn mark_read(&self, id: &MessageId) -> Result<()>;
}

/// HTTP implementation of [`Transport`].
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(NetError::Status {
            code: resp.status().as_u16(),
        })
    }
}

/// Read the body and decode it, keeping transport failures and malformed
/// bodies distinguishable.
async fn decode_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let body = resp.bytes().await?;
    decode_body(&body)
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_messages(
        &self,
        conversation: &ConversationId,
        cursor: Option<&str>,
    ) -> Result<MessagePage> {
        let mut req = self
            .http
            .get(self.url(&format!("conversations/{conversation}/messages")))
            .query(&[("limit", DEFAULT_PAGE_SIZE.to_string())]);
        if let Some(cursor) = cursor {
            req = req.query(&[("cursor", cursor)]);
        }

        let resp = check_status(req.send().await?)?;
        let page: MessagePage = decode_json(resp).await?;
        debug!(
            conversation = %conversation,
            count = page.messages.len(),
            has_more = page.has_more,
            "Fetched message page"
        );
        Ok(page)
    }

    async fn create_message(
        &self,
        conversation: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<Message> {
        let resp = self
            .http
            .post(self.url(&format!("messages/{conversation}")))
            .json(draft)
            .send()
            .await?;
        decode_json(check_status(resp)?).await
    }

    async fn edit_message(&self, id: &MessageId, text: &str) -> Result<Message> {
        let resp = self
            .http
            .patch(self.url(&format!("messages/{id}")))
            .json(&json!({ "text": text }))
            .send()
            .await?;
        decode_json(check_status(resp)?).await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("messages/{id}")))
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }

    async fn add_reaction(&self, id: &MessageId, emoji: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("messages/{id}/reactions")))
            .json(&json!({ "emoji": emoji }))
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }

    async fn remove_reaction(&self, id: &MessageId, emoji: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("messages/{id}/reactions")))
            .json(&json!({ "emoji": emoji }))
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }

    async fn mark_read(&self, id: &MessageId) -> Result<()> {
        let resp = self
            .http
            .patch(self.url(&format!("messages/{id}/read")))
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_normalizes_slashes() {
        let t = HttpTransport::new("https://chat.example.com/api/");
        assert_eq!(
            t.url("/messages/m1/reactions"),
            "https://chat.example.com/api/messages/m1/reactions"
        );
    }

    #[test]
    fn test_malformed_body_is_a_decode_error() {
        let err = decode_body::<Message>(br#"{"id": 42}"#).unwrap_err();
        assert!(matches!(err, NetError::Decode(_)));
    }
}
