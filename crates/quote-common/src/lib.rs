//! Common types and protocol constants shared between quote-server and quote-client.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Protocol constants
// ──────────────────────────────────────────────

/// Route for listing and creating quotes.
pub const QUOTES_PATH: &str = "/quotes";

/// Route for the realtime WebSocket feed.
pub const REALTIME_PATH: &str = "/realtime";

/// Route for the liveness check.
pub const HEALTH_PATH: &str = "/health";

/// Author stored when a quote is submitted without one.
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Default HTTP address of the server.
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";

// ──────────────────────────────────────────────
// Data types
// ──────────────────────────────────────────────

/// A stored quote, as returned by the write/read paths and pushed to
/// realtime subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    /// Assigned by the store, strictly increasing.
    pub id: i64,
    pub text: String,
    pub author: String,
}

/// Body of a write request. Both fields are optional on the wire so that a
/// missing `text` is reported as a validation failure rather than a decode
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewQuote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl NewQuote {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), author: None }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Liveness check payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Health {
    pub status: String,
    /// Number of realtime subscribers currently registered.
    pub subscribers: usize,
}

/// Error body returned by the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Rejection of a write request before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("the 'text' field must be provided")]
    MissingText,
}

/// Errors a client can hit while talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid quote payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("server rejected request ({code}): {message}")]
    Rejected { code: String, message: String },
}

/// Decodes a realtime frame into a [`Quote`].
///
/// ```
/// use quote_common::decode_quote;
///
/// let quote = decode_quote(r#"{"id":1,"text":"Hi","author":"Unknown"}"#).unwrap();
/// assert_eq!(quote.id, 1);
/// ```
pub fn decode_quote(frame: &str) -> Result<Quote, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}
