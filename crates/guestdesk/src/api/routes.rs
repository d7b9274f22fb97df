//! API route definitions.

use axum::http::{Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::ws;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let api_routes = Router::new()
        .route("/conversations", get(handlers::list_conversations))
        .route("/conversations/{id}", get(handlers::get_conversation))
        .route("/conversations/{id}/send", post(handlers::send_message))
        .route(
            "/conversations/{id}/replies",
            get(handlers::list_replies).post(handlers::draft_reply),
        )
        .route(
            "/conversations/{id}/llm-calls",
            get(handlers::list_llm_calls),
        )
        .route(
            "/read-state",
            get(handlers::get_read_state).post(handlers::set_read_state),
        )
        .route("/webhooks/provider", post(handlers::receive_webhook))
        .route("/poll", post(handlers::trigger_poll))
        .route("/events", get(ws::change_events_handler))
        .route("/read-state-events", get(ws::read_state_events_handler));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
