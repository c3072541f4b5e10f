//! FIFO queue of outgoing messages created while disconnected.
//!
//! Unbounded by design; growth is surfaced through the log so hosts can
//! monitor it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::info;

use parley_shared::model::MessageDraft;
use parley_shared::types::{ConversationId, MessageId};

/// One queued outgoing payload, tied to the optimistic placeholder it will
/// reconcile when finally sent.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub conversation_id: ConversationId,
    pub temp_id: MessageId,
    pub draft: MessageDraft,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct OfflineQueue {
    entries: VecDeque<QueueEntry>,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(
        &mut self,
        conversation_id: ConversationId,
        temp_id: MessageId,
        draft: MessageDraft,
    ) {
        self.entries.push_back(QueueEntry {
            conversation_id,
            temp_id,
            draft,
            queued_at: Utc::now(),
        });
        info!(len = self.entries.len(), "Message queued for later delivery");
    }

    /// Next entry in enqueue order.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Put a failed entry back at the head so a later drain retries it
    /// first, preserving the original order.
    pub fn requeue_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_ids(queue: &mut OfflineQueue) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(e) = queue.pop() {
            ids.push(e.temp_id.0);
        }
        ids
    }

    fn enqueue(queue: &mut OfflineQueue, n: u64) {
        queue.enqueue(
            ConversationId::new("c1"),
            MessageId::temp(n),
            MessageDraft::text(format!("msg {n}")),
        );
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = OfflineQueue::new();
        enqueue(&mut queue, 1);
        enqueue(&mut queue, 2);
        enqueue(&mut queue, 3);
        assert_eq!(entry_ids(&mut queue), vec!["temp-1", "temp-2", "temp-3"]);
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let mut queue = OfflineQueue::new();
        enqueue(&mut queue, 1);
        enqueue(&mut queue, 2);

        let failed = queue.pop().unwrap();
        queue.requeue_front(failed);

        assert_eq!(entry_ids(&mut queue), vec!["temp-1", "temp-2"]);
    }
}
