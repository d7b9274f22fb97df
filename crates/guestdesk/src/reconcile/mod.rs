//! Viewer-side reconciliation: optimistic sends, merge against authoritative
//! refreshes and a self-healing event subscription.

mod backoff;
mod outbox;
mod subscription;

pub use backoff::Backoff;
pub use outbox::{Outbox, PendingMessage, PendingState, TranscriptEntry};
pub use subscription::EventSubscription;
