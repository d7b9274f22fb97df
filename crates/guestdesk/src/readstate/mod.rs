//! Per-conversation read/unread tracking.
//!
//! Every mutation flows through [`ReadStateStore::set_read`], which is the
//! single choke point for read-state broadcasts: callers never talk to the
//! read-state hub directly.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ws::{EventHub, ReadStateEvent};

/// Store for read/unread flags. A conversation without a row is unread.
#[derive(Clone)]
pub struct ReadStateStore {
    pool: SqlitePool,
    hub: Arc<EventHub<ReadStateEvent>>,
}

impl ReadStateStore {
    /// Create a new store broadcasting through the given hub.
    pub fn new(pool: SqlitePool, hub: Arc<EventHub<ReadStateEvent>>) -> Self {
        Self { pool, hub }
    }

    /// The hub this store broadcasts read-state changes on.
    pub fn hub(&self) -> Arc<EventHub<ReadStateEvent>> {
        self.hub.clone()
    }

    /// Set a conversation's read flag. Idempotent last-write-wins upsert;
    /// exactly one `ReadStateEvent` is broadcast per call.
    pub async fn set_read(&self, conversation_id: &str, read: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO read_state (conversation_id, is_read)
            VALUES (?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET is_read = excluded.is_read
            "#,
        )
        .bind(conversation_id)
        .bind(read as i32)
        .execute(&self.pool)
        .await
        .context("upserting read state")?;

        self.hub
            .broadcast(&ReadStateEvent {
                conversation_id: conversation_id.to_string(),
                read,
            })
            .await;

        Ok(())
    }

    /// Get one conversation's read flag; absent rows are unread.
    pub async fn get(&self, conversation_id: &str) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT is_read FROM read_state WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching read state")?;

        Ok(row.map(|v| v != 0).unwrap_or(false))
    }

    /// All known read flags keyed by conversation id.
    pub async fn get_all(&self) -> Result<HashMap<String, bool>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT conversation_id, is_read FROM read_state",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing read state")?;

        Ok(rows.into_iter().map(|(id, v)| (id, v != 0)).collect())
    }

    /// Read flags for a set of conversations; ids without a row map to false.
    pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        let all = self.get_all().await?;
        Ok(ids
            .iter()
            .map(|id| (id.clone(), all.get(id).copied().unwrap_or(false)))
            .collect())
    }
}
