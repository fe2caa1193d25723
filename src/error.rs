//! Error types for the ingestion server.

use thiserror::Error;

/// Startup and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol errors raised while turning received bytes into a reading.
///
/// `Display` output is sent back to the client as the error response's
/// `message`, so keep it human readable.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// More bytes are needed before the message can be decoded.
    #[error("incomplete message")]
    Incomplete,

    #[error("connection closed before the message was complete")]
    Truncated,

    #[error("HTTP request is missing the blank line between headers and body")]
    MissingSeparator,

    #[error("Invalid JSON data received: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid reading: {0}")]
    InvalidReading(#[source] serde_json::Error),

    #[error("message exceeds {limit} bytes")]
    TooLarge { limit: usize },
}
