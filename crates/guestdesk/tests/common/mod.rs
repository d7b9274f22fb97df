//! Test utilities and common setup.

use axum::Router;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use guestdesk::api::{self, AppState};
use guestdesk::conversation::ConversationRepository;
use guestdesk::db::Database;
use guestdesk::readstate::ReadStateStore;
use guestdesk::webhook::WebhookIngest;
use guestdesk::ws::EventHub;

/// Webhook secret used by all integration tests.
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Create the application state over an in-memory database.
///
/// Provider sync and reply drafting stay disabled; the webhook endpoint is
/// active with [`WEBHOOK_SECRET`].
pub async fn test_state() -> AppState {
    let db = Database::in_memory().await.unwrap();

    let repo = ConversationRepository::new(db.pool().clone());
    let change_hub = Arc::new(EventHub::new());
    let read_state_hub = Arc::new(EventHub::new());
    let read_state = ReadStateStore::new(db.pool().clone(), read_state_hub.clone());

    let webhook = WebhookIngest::new(
        Some(WEBHOOK_SECRET.to_string()),
        repo.clone(),
        read_state.clone(),
        change_hub.clone(),
    );

    AppState {
        repo,
        read_state,
        change_hub,
        read_state_hub,
        source: None,
        poller: None,
        webhook,
        llm: None,
    }
}

/// Create a test application router over fresh state.
pub async fn test_app() -> Router {
    api::create_router(test_state().await)
}

/// Sign a webhook body the way the provider does.
pub fn sign_webhook(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
