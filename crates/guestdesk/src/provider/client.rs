//! Provider HTTP client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use crate::conversation::Message;

use super::error::{ProviderError, ProviderResult};
use super::{ConversationSource, extract_list, message_from_value};

/// Header carrying the provider access token.
const ACCESS_TOKEN_HEADER: &str = "Hostex-Access-Token";

/// Bound on any single provider request so one slow upstream response cannot
/// stall an entire poll tick.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Client for the booking-platform conversation API.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl ProviderClient {
    /// Create a new provider client.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    async fn get_json(&self, url: &str) -> ProviderResult<Value> {
        let response = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ConversationSource for ProviderClient {
    async fn fetch_conversations(&self, offset: u32, limit: u32) -> ProviderResult<Vec<Value>> {
        let url = format!(
            "{}/conversations?offset={}&limit={}",
            self.base_url, offset, limit
        );
        let envelope = self.get_json(&url).await?;
        extract_list(&envelope, "conversations")
            .ok_or_else(|| ProviderError::Decode("no conversation list in response".to_string()))
    }

    async fn fetch_conversation_detail(&self, id: &str) -> ProviderResult<Value> {
        let url = format!("{}/conversations/{}", self.base_url, id);
        let envelope = self.get_json(&url).await?;
        // The detail object may sit under `data` or at the top level.
        Ok(envelope.get("data").cloned().unwrap_or(envelope))
    }

    async fn fetch_messages(&self, id: &str) -> ProviderResult<Vec<Message>> {
        let url = format!("{}/conversations/{}/messages", self.base_url, id);
        let envelope = self.get_json(&url).await?;
        let list = extract_list(&envelope, "messages")
            .ok_or_else(|| ProviderError::Decode("no message list in response".to_string()))?;
        Ok(list.iter().filter_map(message_from_value).collect())
    }

    async fn send_message(&self, id: &str, content: &str) -> ProviderResult<()> {
        let url = format!("{}/send-message", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "conversation_id": id, "content": content }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
