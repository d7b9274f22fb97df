//! Provider client error types.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur when talking to the provider API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No access token configured; the sync feature is disabled.
    #[error("provider access token not configured")]
    MissingCredential,

    /// HTTP request failed (network error or timeout).
    #[error("provider request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Response body did not have a usable shape.
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}
