//! Event frames delivered to viewers.

use serde::{Deserialize, Serialize};

/// A conversation's message set changed. Level-triggered: consumers re-fetch
/// the full state rather than replaying individual messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
}

/// A conversation's read flag changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStateEvent {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub read: bool,
}
