//! Provider integration: the external booking-platform API.
//!
//! The provider's response schemas are loosely typed; the envelope tolerance
//! lives entirely in [`extract_list`] so callers never probe shapes
//! themselves.

mod client;
mod error;

pub use client::ProviderClient;
pub use error::{ProviderError, ProviderResult};

use async_trait::async_trait;
use serde_json::Value;

use crate::conversation::Message;

/// Seam over the provider API so the poller and handlers can be exercised
/// without a live upstream.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Fetch one page of conversations as raw provider objects.
    async fn fetch_conversations(&self, offset: u32, limit: u32) -> ProviderResult<Vec<Value>>;

    /// Fetch one conversation's detail object (may embed its messages).
    async fn fetch_conversation_detail(&self, id: &str) -> ProviderResult<Value>;

    /// Fetch one conversation's message list.
    async fn fetch_messages(&self, id: &str) -> ProviderResult<Vec<Message>>;

    /// Send an agent reply into a conversation.
    async fn send_message(&self, id: &str, content: &str) -> ProviderResult<()>;
}

/// Pull a list out of a provider response envelope.
///
/// The array may live under `{primary}`, `items`, `data.{primary}`,
/// `data.items` or `data` itself, or the response may be a bare array; the
/// strategies are tried in that order and the first structurally valid match
/// wins.
pub fn extract_list(value: &Value, primary: &str) -> Option<Vec<Value>> {
    let candidates = [
        value.get(primary),
        value.get("items"),
        value.get("data").and_then(|d| d.get(primary)),
        value.get("data").and_then(|d| d.get("items")),
        value.get("data"),
        Some(value),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Value::Array(list) = candidate {
            return Some(list.clone());
        }
    }
    None
}

/// Parse a raw provider object into a [`Message`], tolerating numeric ids.
/// Returns `None` for objects without a usable id.
pub fn message_from_value(value: &Value) -> Option<Message> {
    let mut obj = value.as_object()?.clone();
    match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::Number(n)) => {
            let id = n.to_string();
            obj.insert("id".to_string(), Value::String(id));
        }
        _ => return None,
    }
    serde_json::from_value(Value::Object(obj)).ok()
}
