//! Exponential backoff for reconnection loops.

use std::time::Duration;

/// First retry delay.
const BASE_BACKOFF_MS: u64 = 500;

/// Ceiling for the retry delay.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Doubling backoff with a cap. Deterministic; the viewer reconnect path has
/// no thundering-herd concern.
#[derive(Debug, Clone)]
pub struct Backoff {
    next_ms: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            next_ms: BASE_BACKOFF_MS,
        }
    }

    /// Delay to wait before the next attempt; doubles on each call up to the
    /// cap.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next_ms;
        self.next_ms = (self.next_ms * 2).min(MAX_BACKOFF_MS);
        Duration::from_millis(current)
    }

    /// Reset to the base delay after a successful connection.
    pub fn reset(&mut self) {
        self.next_ms = BASE_BACKOFF_MS;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
