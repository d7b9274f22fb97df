//! Push-path ingest for provider webhook deliveries.
//!
//! The webhook is a low-latency hint, not a second source of truth: a
//! verified `message.created` event marks the conversation unread, records an
//! audit row and nudges viewers, while the poller remains responsible for
//! mirroring the actual message bodies. Signature verification happens over
//! the raw request body before any JSON parsing, and a rejected delivery has
//! zero side effects.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversation::ConversationRepository;
use crate::readstate::ReadStateStore;
use crate::ws::{ChangeEvent, EventHub};

type HmacSha256 = Hmac<Sha256>;

/// Event types that announce a new inbound message. The provider has shipped
/// both spellings across API versions.
const MESSAGE_CREATED_TYPES: [&str; 2] = ["message.created", "message_created"];

/// Result type for webhook ingest.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Errors surfaced to the delivery endpoint.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No webhook secret configured; deliveries cannot be authenticated.
    #[error("webhook secret not configured")]
    Unconfigured,

    /// Missing or mismatched signature. The body was not inspected.
    #[error("webhook signature rejected")]
    InvalidSignature,

    /// Body passed verification but is not parseable JSON.
    #[error("webhook body is not valid JSON: {0}")]
    MalformedBody(#[from] serde_json::Error),

    /// Persistence failed after the event was accepted.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What ingest did with an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A new-message event was applied to the named conversation.
    Processed { conversation_id: String },
    /// The event was authentic but not one this engine acts on.
    Ignored,
}

/// Verifier and applier for provider webhook deliveries.
#[derive(Clone)]
pub struct WebhookIngest {
    secret: String,
    repo: ConversationRepository,
    read_state: ReadStateStore,
    change_hub: Arc<EventHub<ChangeEvent>>,
}

impl WebhookIngest {
    /// Create an ingest bound to the shared secret. Returns `None` when no
    /// secret is configured, which disables the endpoint.
    pub fn new(
        secret: Option<String>,
        repo: ConversationRepository,
        read_state: ReadStateStore,
        change_hub: Arc<EventHub<ChangeEvent>>,
    ) -> Option<Self> {
        let secret = secret.filter(|s| !s.is_empty())?;
        Some(Self {
            secret,
            repo,
            read_state,
            change_hub,
        })
    }

    /// Verify and apply one delivery.
    ///
    /// `raw_body` must be the bytes exactly as received; the signature covers
    /// them pre-parse, so any re-serialization would break verification.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> WebhookResult<WebhookOutcome> {
        self.verify_signature(raw_body, signature)?;

        let event: Value = serde_json::from_slice(raw_body)?;
        // Some provider API versions label the event `type`, others `event`.
        let event_type = event
            .get("type")
            .or_else(|| event.get("event"))
            .and_then(Value::as_str)
            .unwrap_or("");

        if !MESSAGE_CREATED_TYPES.contains(&event_type) {
            debug!(event_type, "Ignoring webhook event type");
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(conversation_id) = extract_conversation_id(&event) else {
            warn!("Dropping message event without conversation id");
            return Ok(WebhookOutcome::Ignored);
        };

        self.read_state.set_read(&conversation_id, false).await?;
        self.repo
            .add_webhook_record(event_type, &conversation_id, &event)
            .await?;
        self.change_hub
            .broadcast(&ChangeEvent {
                conversation_id: conversation_id.clone(),
            })
            .await;

        info!(conversation = %conversation_id, "Webhook event applied");
        Ok(WebhookOutcome::Processed { conversation_id })
    }

    /// Constant-time HMAC-SHA256 check of the hex signature over the raw
    /// body.
    fn verify_signature(&self, raw_body: &[u8], signature: Option<&str>) -> WebhookResult<()> {
        let provided = signature.ok_or(WebhookError::InvalidSignature)?;
        let provided = hex::decode(provided.trim()).map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::Unconfigured)?;
        mac.update(raw_body);
        mac.verify_slice(&provided)
            .map_err(|_| WebhookError::InvalidSignature)
    }
}

/// Pull the conversation id out of an event, tolerating the envelope variants
/// the provider has shipped: top-level `conversation_id`, nested
/// `data.conversation_id` and camel-cased `data.conversationId`.
fn extract_conversation_id(event: &Value) -> Option<String> {
    let candidates = [
        event.get("conversation_id"),
        event.get("data").and_then(|d| d.get("conversation_id")),
        event.get("data").and_then(|d| d.get("conversationId")),
    ];

    for candidate in candidates.into_iter().flatten() {
        match candidate {
            Value::String(s) if !s.is_empty() => return Some(s.clone()),
            Value::Number(n) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}
