//! Shared application state for API handlers.

use std::sync::Arc;

use crate::conversation::ConversationRepository;
use crate::llm::LlmClient;
use crate::poller::Poller;
use crate::provider::ConversationSource;
use crate::readstate::ReadStateStore;
use crate::webhook::WebhookIngest;
use crate::ws::{ChangeEvent, EventHub, ReadStateEvent};

/// Application state shared across all handlers.
///
/// The optional members correspond to features that degrade independently:
/// without provider credentials there is no `source`/`poller`, without a
/// webhook secret no `webhook`, without an LLM key no `llm`. Handlers answer
/// 503 for a disabled feature; everything else keeps working.
#[derive(Clone)]
pub struct AppState {
    pub repo: ConversationRepository,
    pub read_state: ReadStateStore,
    pub change_hub: Arc<EventHub<ChangeEvent>>,
    pub read_state_hub: Arc<EventHub<ReadStateEvent>>,
    pub source: Option<Arc<dyn ConversationSource>>,
    pub poller: Option<Arc<Poller>>,
    pub webhook: Option<WebhookIngest>,
    pub llm: Option<LlmClient>,
}
