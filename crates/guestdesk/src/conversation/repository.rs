//! Repository for conversation, message, reply and webhook-audit persistence.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{Conversation, LlmCall, Message, Reply, WebhookRecord};

/// Repository for conversation data access. Pure persistence; no business
/// logic beyond the idempotency contracts.
#[derive(Debug, Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a new repository instance.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========== Conversations ==========

    /// Upsert a conversation by its external id. Last write wins on the
    /// provider attributes; messages are untouched.
    pub async fn upsert_conversation(&self, conv: &Conversation) -> Result<()> {
        let data = serde_json::to_string(&conv.attributes).context("serializing conversation")?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO conversations (id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(&conv.id)
        .bind(&data)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("upserting conversation")?;

        Ok(())
    }

    /// List all conversations, most recently active first, messages omitted.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT id, data FROM conversations ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing conversations")?;

        rows.into_iter()
            .map(|(id, data)| {
                let attributes =
                    serde_json::from_str(&data).context("parsing stored conversation")?;
                Ok(Conversation { id, attributes })
            })
            .collect()
    }

    /// Fetch one conversation by id, or `None` when it was never seen.
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, (String,)>("SELECT data FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching conversation")?;

        match row {
            Some((data,)) => {
                let attributes =
                    serde_json::from_str(&data).context("parsing stored conversation")?;
                Ok(Some(Conversation {
                    id: id.to_string(),
                    attributes,
                }))
            }
            None => Ok(None),
        }
    }

    // ========== Messages ==========

    /// Insert messages that are not yet stored, returning only the newly
    /// inserted subsequence. Existing messages are never overwritten; the
    /// provider may resend the same page on every poll.
    ///
    /// The batch is atomic: if any insert fails, nothing from the batch is
    /// kept, so a later retry re-detects every message as new. A partial
    /// commit would leave messages that never trigger their unread-force or
    /// change notification.
    pub async fn insert_messages_if_absent(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<Vec<Message>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting message batch transaction")?;
        let mut added = Vec::new();

        for msg in messages {
            let data = serde_json::to_string(msg).context("serializing message")?;
            let created_at = msg
                .created_at
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339());

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO messages (id, conversation_id, data, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&msg.id)
            .bind(conversation_id)
            .bind(&data)
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .context("inserting message")?;

            if result.rows_affected() > 0 {
                added.push(msg.clone());
            }
        }

        tx.commit()
            .await
            .context("committing message batch transaction")?;
        Ok(added)
    }

    /// List a conversation's messages ordered by creation timestamp
    /// ascending, ties broken by insertion order.
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT data FROM messages WHERE conversation_id = ? ORDER BY created_at, seq",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("listing messages")?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_str(&data).context("parsing stored message"))
            .collect()
    }

    // ========== Reply drafts ==========

    /// Store a model-generated reply draft.
    pub async fn add_reply(
        &self,
        conversation_id: &str,
        text: &str,
        model: &str,
    ) -> Result<Reply> {
        let reply = Reply {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
            model: model.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            r#"
            INSERT INTO replies (id, conversation_id, text, model, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reply.id)
        .bind(&reply.conversation_id)
        .bind(&reply.text)
        .bind(&reply.model)
        .bind(&reply.created_at)
        .execute(&self.pool)
        .await
        .context("inserting reply draft")?;

        Ok(reply)
    }

    /// List reply drafts for a conversation, oldest first.
    pub async fn list_replies(&self, conversation_id: &str) -> Result<Vec<Reply>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT id, conversation_id, text, model, created_at
            FROM replies WHERE conversation_id = ? ORDER BY created_at
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("listing reply drafts")?;

        Ok(rows
            .into_iter()
            .map(|(id, conversation_id, text, model, created_at)| Reply {
                id,
                conversation_id,
                text,
                model,
                created_at,
            })
            .collect())
    }

    // ========== LLM call audit ==========

    /// Record one language-model exchange for a conversation.
    pub async fn add_llm_call(&self, conversation_id: &str, payload: &Value) -> Result<LlmCall> {
        let call = LlmCall {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            payload: payload.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            r#"
            INSERT INTO llm_calls (id, conversation_id, payload, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&call.id)
        .bind(&call.conversation_id)
        .bind(call.payload.to_string())
        .bind(&call.created_at)
        .execute(&self.pool)
        .await
        .context("inserting llm call record")?;

        Ok(call)
    }

    /// List a conversation's audited language-model calls, oldest first.
    pub async fn list_llm_calls(&self, conversation_id: &str) -> Result<Vec<LlmCall>> {
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            r#"
            SELECT id, conversation_id, payload, created_at
            FROM llm_calls WHERE conversation_id = ? ORDER BY created_at
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("listing llm call records")?;

        rows.into_iter()
            .map(|(id, conversation_id, payload, created_at)| {
                let payload =
                    serde_json::from_str(&payload).context("parsing stored llm call")?;
                Ok(LlmCall {
                    id,
                    conversation_id,
                    payload,
                    created_at,
                })
            })
            .collect()
    }

    // ========== Webhook audit ==========

    /// Persist an immutable audit record of a raw webhook event.
    pub async fn add_webhook_record(
        &self,
        event_type: &str,
        conversation_id: &str,
        payload: &Value,
    ) -> Result<WebhookRecord> {
        let record = WebhookRecord {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            conversation_id: conversation_id.to_string(),
            payload: payload.clone(),
            received_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            r#"
            INSERT INTO webhook_events (id, type, conversation_id, payload, received_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.event_type)
        .bind(&record.conversation_id)
        .bind(record.payload.to_string())
        .bind(&record.received_at)
        .execute(&self.pool)
        .await
        .context("inserting webhook audit record")?;

        Ok(record)
    }

    /// Count stored webhook audit records (used by tests and diagnostics).
    pub async fn count_webhook_records(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM webhook_events")
            .fetch_one(&self.pool)
            .await
            .context("counting webhook audit records")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    async fn repo() -> ConversationRepository {
        let db = Database::in_memory().await.unwrap();
        ConversationRepository::new(db.pool().clone())
    }

    fn msg(id: &str, role: &str, content: &str, created_at: &str) -> Message {
        serde_json::from_value(json!({
            "id": id,
            "sender_role": role,
            "content": content,
            "created_at": created_at,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_conversation_idempotent() {
        let repo = repo().await;
        let conv = Conversation::from_provider(&json!({ "id": "c1", "subject": "a" })).unwrap();

        repo.upsert_conversation(&conv).await.unwrap();
        repo.upsert_conversation(&conv).await.unwrap();

        let list = repo.list_conversations().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].attributes["subject"], "a");
    }

    #[tokio::test]
    async fn test_upsert_conversation_last_write_wins() {
        let repo = repo().await;
        let v1 = Conversation::from_provider(&json!({ "id": "c1", "subject": "old" })).unwrap();
        let v2 = Conversation::from_provider(&json!({ "id": "c1", "subject": "new" })).unwrap();

        repo.upsert_conversation(&v1).await.unwrap();
        repo.upsert_conversation(&v2).await.unwrap();

        let conv = repo.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(conv.attributes["subject"], "new");
    }

    #[tokio::test]
    async fn test_get_conversation_not_found() {
        let repo = repo().await;
        assert!(repo.get_conversation("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_messages_if_absent_returns_only_new() {
        let repo = repo().await;
        let m1 = msg("m1", "guest", "Hi", "2026-08-01T10:00:00Z");
        let m2 = msg("m2", "host", "Hello!", "2026-08-01T10:01:00Z");

        let added = repo
            .insert_messages_if_absent("c1", &[m1.clone()])
            .await
            .unwrap();
        assert_eq!(added.len(), 1);

        // Second application of the same input inserts nothing.
        let added = repo
            .insert_messages_if_absent("c1", &[m1.clone()])
            .await
            .unwrap();
        assert!(added.is_empty());

        // A resend plus one genuinely new message yields only the new one.
        let added = repo
            .insert_messages_if_absent("c1", &[m1, m2])
            .await
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, "m2");
    }

    #[tokio::test]
    async fn test_failed_batch_inserts_nothing() {
        let db = Database::in_memory().await.unwrap();
        let repo = ConversationRepository::new(db.pool().clone());
        // Inject a mid-batch failure on the second message.
        sqlx::query(
            "CREATE TRIGGER reject_m2 BEFORE INSERT ON messages \
             WHEN NEW.id = 'm2' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let batch = [
            msg("m1", "guest", "Hi", "2026-08-01T10:00:00Z"),
            msg("m2", "guest", "Anyone there?", "2026-08-01T10:01:00Z"),
        ];
        assert!(repo.insert_messages_if_absent("c1", &batch).await.is_err());
        // The whole batch rolled back, m1 included.
        assert!(repo.list_messages("c1").await.unwrap().is_empty());

        // Once the failure clears, a retry re-detects every message as new.
        sqlx::query("DROP TRIGGER reject_m2")
            .execute(db.pool())
            .await
            .unwrap();
        let added = repo.insert_messages_if_absent("c1", &batch).await.unwrap();
        assert_eq!(added.len(), 2);
    }

    #[tokio::test]
    async fn test_messages_never_overwritten() {
        let repo = repo().await;
        let original = msg("m1", "guest", "first", "2026-08-01T10:00:00Z");
        let resent = msg("m1", "guest", "tampered", "2026-08-01T10:00:00Z");

        repo.insert_messages_if_absent("c1", &[original])
            .await
            .unwrap();
        repo.insert_messages_if_absent("c1", &[resent])
            .await
            .unwrap();

        let stored = repo.list_messages("c1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_list_messages_ordering_with_stable_ties() {
        let repo = repo().await;
        let ts = "2026-08-01T10:00:00Z";
        repo.insert_messages_if_absent(
            "c1",
            &[
                msg("b", "guest", "second tie", ts),
                msg("a", "guest", "earliest", "2026-08-01T09:00:00Z"),
            ],
        )
        .await
        .unwrap();
        repo.insert_messages_if_absent("c1", &[msg("c", "guest", "third tie", ts)])
            .await
            .unwrap();

        let stored = repo.list_messages("c1").await.unwrap();
        let ids: Vec<_> = stored.iter().map(|m| m.id.as_str()).collect();
        // Non-decreasing created_at, insertion order within the tie.
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_reply_drafts_round_trip() {
        let repo = repo().await;
        let reply = repo
            .add_reply("c1", "Thanks for reaching out!", "gpt-4o-mini")
            .await
            .unwrap();

        let drafts = repo.list_replies("c1").await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, reply.id);
        assert_eq!(drafts[0].text, "Thanks for reaching out!");
    }

    #[tokio::test]
    async fn test_llm_call_audit_round_trip() {
        let repo = repo().await;
        let payload = json!({
            "request": { "model": "gpt-4o-mini", "messages": [] },
            "response": { "choices": [] },
        });
        let call = repo.add_llm_call("c1", &payload).await.unwrap();

        let calls = repo.list_llm_calls("c1").await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, call.id);
        assert_eq!(calls[0].payload["request"]["model"], "gpt-4o-mini");
        assert!(repo.list_llm_calls("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_audit_record() {
        let repo = repo().await;
        let payload = json!({ "type": "message.created", "conversation_id": "c1" });
        repo.add_webhook_record("message.created", "c1", &payload)
            .await
            .unwrap();
        assert_eq!(repo.count_webhook_records().await.unwrap(), 1);
    }
}
