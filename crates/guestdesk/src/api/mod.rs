//! HTTP API module.
//!
//! REST endpoints for conversations, read state, reply drafts and webhook
//! ingest, plus the WebSocket event streams.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
