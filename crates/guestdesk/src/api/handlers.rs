//! HTTP handlers for the conversation API.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;

use crate::conversation::{Conversation, Reply};
use crate::poller::PollSummary;
use crate::webhook::WebhookOutcome;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Header the provider signs its webhook deliveries with.
const SIGNATURE_HEADER: &str = "hostex-signature";

/// Health check.
///
/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// List all mirrored conversations with their read flags, most recently
/// active first. Messages are omitted.
///
/// GET /api/conversations
pub async fn list_conversations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let conversations = state.repo.list_conversations().await?;
    let ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();
    let flags = state.read_state.get_many(&ids).await?;

    let items: Vec<Value> = conversations
        .iter()
        .map(|conv| conversation_json(conv, flags.get(&conv.id).copied().unwrap_or(false)))
        .collect();

    Ok(Json(json!({ "conversations": items })))
}

/// Fetch one conversation with its ordered transcript.
///
/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conv = state
        .repo
        .get_conversation(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("conversation {id}")))?;

    let messages = state.repo.list_messages(&id).await?;
    let is_read = state.read_state.get(&id).await?;

    let mut body = conversation_json(&conv, is_read);
    body["messages"] = serde_json::to_value(&messages).map_err(anyhow::Error::from)?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Send an agent reply through the provider. The sent message appears in the
/// stored transcript once the provider mirrors it back.
///
/// POST /api/conversations/{id}/send
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<Value>> {
    let source = state
        .source
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("provider access not configured"))?;

    if request.content.trim().is_empty() {
        return Err(ApiError::bad_request("message content must not be empty"));
    }
    if state.repo.get_conversation(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("conversation {id}")));
    }

    source.send_message(&id, &request.content).await?;
    info!(conversation = %id, "Message sent to provider");
    Ok(Json(json!({ "status": "sent" })))
}

/// Draft a reply with the language model, audit the exchange and store the
/// draft alongside the conversation.
///
/// POST /api/conversations/{id}/replies
pub async fn draft_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Reply>> {
    let llm = state
        .llm
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("reply drafting not configured"))?;

    let conv = state
        .repo
        .get_conversation(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("conversation {id}")))?;
    let transcript = state.repo.list_messages(&id).await?;

    let draft = llm.draft_reply(&conv, &transcript).await?;
    state.repo.add_llm_call(&id, &draft.exchange).await?;
    let reply = state.repo.add_reply(&id, &draft.text, llm.model()).await?;
    Ok(Json(reply))
}

/// List stored reply drafts for a conversation, oldest first.
///
/// GET /api/conversations/{id}/replies
pub async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Reply>>> {
    if state.repo.get_conversation(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("conversation {id}")));
    }
    Ok(Json(state.repo.list_replies(&id).await?))
}

/// List the audited language-model calls for a conversation, oldest first.
///
/// GET /api/conversations/{id}/llm-calls
pub async fn list_llm_calls(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if state.repo.get_conversation(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("conversation {id}")));
    }
    let calls = state.repo.list_llm_calls(&id).await?;
    Ok(Json(json!({ "calls": calls })))
}

/// All known read flags keyed by conversation id.
///
/// GET /api/read-state
pub async fn get_read_state(
    State(state): State<AppState>,
) -> ApiResult<Json<HashMap<String, bool>>> {
    Ok(Json(state.read_state.get_all().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStateRequest {
    pub conversation_id: String,
    pub read: bool,
}

/// Set one conversation's read flag.
///
/// POST /api/read-state
pub async fn set_read_state(
    State(state): State<AppState>,
    Json(request): Json<ReadStateRequest>,
) -> ApiResult<Json<Value>> {
    if request.conversation_id.is_empty() {
        return Err(ApiError::bad_request("conversationId must not be empty"));
    }
    state
        .read_state
        .set_read(&request.conversation_id, request.read)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Receive a signed provider webhook delivery.
///
/// POST /api/webhooks/provider
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let ingest = state
        .webhook
        .as_ref()
        .ok_or_else(|| ApiError::internal("webhook secret not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match ingest.handle(&body, signature).await? {
        WebhookOutcome::Processed { conversation_id } => Ok(Json(json!({
            "status": "processed",
            "conversationId": conversation_id,
        }))),
        WebhookOutcome::Ignored => Ok(Json(json!({ "status": "ignored" }))),
    }
}

/// Run one poll tick synchronously and report what it did.
///
/// POST /api/poll
pub async fn trigger_poll(State(state): State<AppState>) -> ApiResult<Json<PollSummary>> {
    let poller = state
        .poller
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("provider access not configured"))?;

    let summary = poller
        .poll_once()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("{e:#}")))?;
    Ok(Json(summary))
}

/// Serialize a conversation for API responses: provider attributes at the top
/// level plus `id` and the merged `isRead` flag.
fn conversation_json(conv: &Conversation, is_read: bool) -> Value {
    let mut obj = conv.attributes.clone();
    obj.insert("id".to_string(), Value::String(conv.id.clone()));
    obj.insert("isRead".to_string(), Value::Bool(is_read));
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_json_shape() {
        let conv = Conversation::from_provider(&json!({
            "id": "c1",
            "subject": "Hot tub",
        }))
        .unwrap();

        let body = conversation_json(&conv, true);
        assert_eq!(body["id"], "c1");
        assert_eq!(body["isRead"], true);
        assert_eq!(body["subject"], "Hot tub");
    }
}
