//! WebSocket fan-out for viewer change notifications.
//!
//! Two independent hubs share one abstraction: the change hub carries
//! "conversation contents changed" events, the read-state hub carries
//! read-flag changes. Delivery is at-least-once to currently connected
//! viewers only; a viewer that connects later recovers by re-fetching.

mod handler;
mod hub;
mod types;

pub use handler::{change_events_handler, read_state_events_handler};
pub use hub::EventHub;
pub use types::{ChangeEvent, ReadStateEvent};
