//! Data models for conversations and messages.
//!
//! The provider is the source of truth and its schemas are loosely typed, so
//! conversation and message bodies are carried as opaque JSON with typed
//! accessors only for the fields the engine itself needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sender role the provider assigns to agent-authored messages.
pub const HOST_ROLE: &str = "host";

/// A conversation as mirrored from the provider.
///
/// `attributes` is the provider's conversation object verbatim (subject,
/// customer, property, stay dates, ...); this subsystem never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Conversation {
    /// Build a conversation from a raw provider object. Returns `None` when
    /// the object carries no usable id.
    pub fn from_provider(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        let mut attributes = obj.clone();
        attributes.remove("id");
        Some(Self { id, attributes })
    }
}

/// A single message within a conversation.
///
/// Identity is `(conversation, id)`; a stored message is never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Whether this message was authored by the agent side.
    pub fn is_host(&self) -> bool {
        self.sender_role.as_deref() == Some(HOST_ROLE)
    }

    /// Creation timestamp parsed as UTC, when the provider supplied one in a
    /// recognizable format.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A reply draft produced by the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub text: String,
    pub model: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Audit record of one language-model call: the full request and response
/// exchange, kept so a drafted reply can be traced back to what produced it.
#[derive(Debug, Clone, Serialize)]
pub struct LlmCall {
    pub id: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub payload: Value,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Immutable audit record of a received webhook event.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub payload: Value,
    #[serde(rename = "receivedAt")]
    pub received_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_from_provider_string_id() {
        let conv = Conversation::from_provider(&json!({
            "id": "c1",
            "subject": "Booking question"
        }))
        .unwrap();
        assert_eq!(conv.id, "c1");
        assert_eq!(conv.attributes["subject"], "Booking question");
        assert!(!conv.attributes.contains_key("id"));
    }

    #[test]
    fn test_conversation_from_provider_numeric_id() {
        let conv = Conversation::from_provider(&json!({ "id": 42 })).unwrap();
        assert_eq!(conv.id, "42");
    }

    #[test]
    fn test_conversation_from_provider_missing_id() {
        assert!(Conversation::from_provider(&json!({ "subject": "x" })).is_none());
        assert!(Conversation::from_provider(&json!("not an object")).is_none());
    }

    #[test]
    fn test_message_host_role() {
        let host: Message = serde_json::from_value(json!({
            "id": "m1",
            "sender_role": "host",
            "content": "Hello!"
        }))
        .unwrap();
        let guest: Message = serde_json::from_value(json!({
            "id": "m2",
            "sender_role": "guest",
            "content": "Hi"
        }))
        .unwrap();
        assert!(host.is_host());
        assert!(!guest.is_host());
    }

    #[test]
    fn test_message_preserves_unknown_fields() {
        let msg: Message = serde_json::from_value(json!({
            "id": "m1",
            "content": "photo",
            "display_type": "image",
            "attachment": { "url": "https://example.com/a.jpg" }
        }))
        .unwrap();
        assert_eq!(msg.extra["display_type"], "image");
        let round_trip = serde_json::to_value(&msg).unwrap();
        assert_eq!(round_trip["attachment"]["url"], "https://example.com/a.jpg");
    }

    #[test]
    fn test_message_created_at_parsing() {
        let msg: Message = serde_json::from_value(json!({
            "id": "m1",
            "created_at": "2026-08-01T10:00:00Z"
        }))
        .unwrap();
        assert!(msg.created_at_utc().is_some());

        let bad: Message = serde_json::from_value(json!({
            "id": "m2",
            "created_at": "yesterday"
        }))
        .unwrap();
        assert!(bad.created_at_utc().is_none());
    }
}
