//! Optimistic send tracking for a viewer.
//!
//! A submitted message shows up in the transcript immediately as a pending
//! entry; authoritative refreshes confirm it once the mirrored host message
//! comes back. Identity across the refresh boundary is fuzzy on purpose: the
//! provider assigns its own message id, so confirmation matches on role,
//! content and timestamp instead.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::conversation::Message;

/// Lifecycle of an optimistic send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Sent to the backend, not yet seen in an authoritative refresh.
    Submitted,
    /// The send request failed. Terminal; the entry stays visible so the
    /// viewer can retry explicitly.
    Failed,
}

/// One optimistic send awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    pub state: PendingState,
}

impl PendingMessage {
    /// Whether a refreshed message confirms this entry: authored by the
    /// agent side, identical content, created no earlier than submission.
    fn is_confirmed_by(&self, message: &Message) -> bool {
        if self.state != PendingState::Submitted || !message.is_host() {
            return false;
        }
        if message.content.as_deref() != Some(self.content.as_str()) {
            return false;
        }
        match message.created_at_utc() {
            Some(created) => created >= self.submitted_at,
            // No parseable timestamp: trust the content match.
            None => true,
        }
    }
}

/// One entry in the merged transcript view.
#[derive(Debug, Clone)]
pub enum TranscriptEntry {
    /// An authoritative stored message.
    Stored(Message),
    /// An optimistic entry not yet confirmed (or failed).
    Pending(PendingMessage),
}

impl TranscriptEntry {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            TranscriptEntry::Stored(m) => m.created_at_utc(),
            TranscriptEntry::Pending(p) => Some(p.submitted_at),
        }
    }
}

/// Pending sends for one conversation.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<PendingMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an optimistic send, returning its local id.
    pub fn submit(&mut self, conversation_id: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.pending.push(PendingMessage {
            id: id.clone(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            submitted_at: Utc::now(),
            state: PendingState::Submitted,
        });
        id
    }

    /// Mark a pending entry failed after its send request errored.
    pub fn mark_failed(&mut self, id: &str) {
        if let Some(entry) = self.pending.iter_mut().find(|p| p.id == id) {
            entry.state = PendingState::Failed;
        }
    }

    /// Drop every pending entry the refreshed transcript confirms. Each
    /// stored message confirms at most one entry.
    pub fn reconcile(&mut self, refreshed: &[Message]) {
        let mut available: Vec<&Message> = refreshed.iter().collect();
        self.pending.retain(|pending| {
            match available.iter().position(|m| pending.is_confirmed_by(m)) {
                Some(idx) => {
                    available.remove(idx);
                    false
                }
                None => true,
            }
        });
    }

    /// Splice the unconfirmed entries into the authoritative transcript,
    /// ordered by timestamp with pending entries after stored ones on ties.
    pub fn merged_transcript(&self, refreshed: &[Message]) -> Vec<TranscriptEntry> {
        let mut merged: Vec<TranscriptEntry> = refreshed
            .iter()
            .cloned()
            .map(TranscriptEntry::Stored)
            .collect();
        merged.extend(
            self.pending
                .iter()
                .cloned()
                .map(TranscriptEntry::Pending),
        );
        // Stored messages arrive pre-sorted; stable sort keeps their relative
        // order and places undated entries first.
        merged.sort_by_key(|entry| entry.timestamp());
        merged
    }

    /// Current pending entries, unconfirmed and failed alike.
    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host_msg(id: &str, content: &str, created_at: &str) -> Message {
        serde_json::from_value(json!({
            "id": id,
            "sender_role": "host",
            "content": content,
            "created_at": created_at,
        }))
        .unwrap()
    }

    fn guest_msg(id: &str, content: &str, created_at: &str) -> Message {
        serde_json::from_value(json!({
            "id": id,
            "sender_role": "guest",
            "content": content,
            "created_at": created_at,
        }))
        .unwrap()
    }

    fn future_ts() -> String {
        (Utc::now() + chrono::Duration::seconds(5)).to_rfc3339()
    }

    #[test]
    fn test_submit_then_confirm_yields_single_entry() {
        let mut outbox = Outbox::new();
        outbox.submit("c1", "hi");
        assert_eq!(outbox.pending().len(), 1);

        // Refresh now carries the mirrored host message.
        let refreshed = vec![host_msg("m9", "hi", &future_ts())];
        outbox.reconcile(&refreshed);
        assert!(outbox.pending().is_empty());

        let merged = outbox.merged_transcript(&refreshed);
        assert_eq!(merged.len(), 1);
        assert!(matches!(&merged[0], TranscriptEntry::Stored(m) if m.id == "m9"));
    }

    #[test]
    fn test_unconfirmed_entry_stays_spliced_in() {
        let mut outbox = Outbox::new();
        outbox.submit("c1", "on my way");

        // Refresh does not carry the send yet.
        let refreshed = vec![guest_msg("m1", "where are you?", "2026-08-01T10:00:00Z")];
        outbox.reconcile(&refreshed);
        assert_eq!(outbox.pending().len(), 1);

        let merged = outbox.merged_transcript(&refreshed);
        assert_eq!(merged.len(), 2);
        assert!(matches!(&merged[0], TranscriptEntry::Stored(_)));
        assert!(matches!(&merged[1], TranscriptEntry::Pending(_)));
    }

    #[test]
    fn test_guest_message_with_same_content_does_not_confirm() {
        let mut outbox = Outbox::new();
        outbox.submit("c1", "ok");
        outbox.reconcile(&[guest_msg("m1", "ok", &future_ts())]);
        assert_eq!(outbox.pending().len(), 1);
    }

    #[test]
    fn test_earlier_host_message_does_not_confirm() {
        let mut outbox = Outbox::new();
        outbox.submit("c1", "ok");
        // A pre-existing identical host message from before the submission.
        outbox.reconcile(&[host_msg("m1", "ok", "2020-01-01T00:00:00Z")]);
        assert_eq!(outbox.pending().len(), 1);
    }

    #[test]
    fn test_one_message_confirms_only_one_duplicate_send() {
        let mut outbox = Outbox::new();
        outbox.submit("c1", "thanks!");
        outbox.submit("c1", "thanks!");

        outbox.reconcile(&[host_msg("m1", "thanks!", &future_ts())]);
        assert_eq!(outbox.pending().len(), 1);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut outbox = Outbox::new();
        let id = outbox.submit("c1", "hi");
        outbox.mark_failed(&id);

        // Even a matching refresh never confirms a failed entry.
        outbox.reconcile(&[host_msg("m1", "hi", &future_ts())]);
        assert_eq!(outbox.pending().len(), 1);
        assert_eq!(outbox.pending()[0].state, PendingState::Failed);
    }

    #[test]
    fn test_merged_transcript_timestamp_order() {
        let mut outbox = Outbox::new();
        outbox.submit("c1", "newest");

        let refreshed = vec![
            guest_msg("m1", "first", "2026-08-01T09:00:00Z"),
            host_msg("m2", "second", "2026-08-01T10:00:00Z"),
        ];
        let merged = outbox.merged_transcript(&refreshed);
        assert_eq!(merged.len(), 3);
        assert!(matches!(&merged[0], TranscriptEntry::Stored(m) if m.id == "m1"));
        assert!(matches!(&merged[1], TranscriptEntry::Stored(m) if m.id == "m2"));
        assert!(matches!(&merged[2], TranscriptEntry::Pending(_)));
    }
}
