//! Conversations, messages and reply drafts.

mod models;
mod repository;

pub use models::{Conversation, LlmCall, Message, Reply, WebhookRecord};
pub use repository::ConversationRepository;
