//! Gateway error types.

use thiserror::Error;

/// Errors that can occur when talking to the gateway.
#[derive(Debug, Error)]
pub enum WahaError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Gateway returned a non-success status.
    #[error("gateway error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body was not the JSON we expected.
    #[error("failed to decode gateway response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl WahaError {
    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            WahaError::Api { status, .. } => Some(*status),
            WahaError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
