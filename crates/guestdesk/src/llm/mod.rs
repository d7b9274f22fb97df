//! Reply drafting via an OpenAI-compatible chat-completions API.
//!
//! The transcript is mapped onto chat roles from the agent's point of view:
//! host messages become `assistant` turns, everything else becomes `user`
//! turns. Drafts are suggestions stored alongside the conversation; nothing
//! here sends anything to the guest.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

use crate::conversation::{Conversation, Message};

/// Result type for drafting operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors from the drafting backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured; drafting is disabled.
    #[error("language model API key not configured")]
    MissingCredential,

    /// HTTP request failed (network error or timeout).
    #[error("language model request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Backend returned a non-success status.
    #[error("language model returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Response body was not the expected completion shape.
    #[error("language model response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response parsed but contained no usable completion.
    #[error("language model response contained no completion")]
    EmptyCompletion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Drafting requests wait longer than sync traffic; completions are slow.
const REQUEST_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str = "You are a helpful assistant drafting replies for a \
short-term-rental host. Write a concise, friendly reply to the guest's latest \
message. Reply with the message text only.";

/// A drafted reply together with the full request/response exchange that
/// produced it, for the audit trail.
#[derive(Debug, Clone)]
pub struct Draft {
    pub text: String,
    pub exchange: Value,
}

/// Client for the chat-completions drafting backend.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// Create a new drafting client.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// The model name sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Draft one reply for a conversation given its stored transcript.
    pub async fn draft_reply(
        &self,
        conversation: &Conversation,
        transcript: &[Message],
    ) -> LlmResult<Draft> {
        let request = json!({
            "model": self.model,
            "messages": build_chat_messages(conversation, transcript),
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        // Keep the raw response alongside the parsed completion so the
        // audited exchange is exactly what went over the wire.
        let raw: Value = response.json().await?;
        let parsed: ChatResponse = serde_json::from_value(raw.clone())?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::EmptyCompletion)?;

        Ok(Draft {
            text,
            exchange: json!({ "request": request, "response": raw }),
        })
    }
}

/// Build the chat transcript: one system turn, then the stored messages in
/// order with host turns as `assistant` and guest turns as `user`. Messages
/// without text content are skipped.
fn build_chat_messages(conversation: &Conversation, transcript: &[Message]) -> Vec<ChatMessage> {
    let mut system = SYSTEM_PROMPT.to_string();
    if let Some(subject) = conversation
        .attributes
        .get("subject")
        .and_then(|v| v.as_str())
    {
        system.push_str(&format!(" The conversation concerns: {subject}."));
    }

    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        content: system,
    }];

    for msg in transcript {
        let Some(content) = msg.content.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        messages.push(ChatMessage {
            role: if msg.is_host() { "assistant" } else { "user" }.to_string(),
            content: content.to_string(),
        });
    }

    messages
}
