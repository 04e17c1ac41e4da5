//! Error types for the relay.
//!
//! Startup and connection plumbing uses `anyhow` with context. The enums
//! here cover the places where a caller needs to tell failure kinds apart.

use thiserror::Error;

/// Failure of the external scene analysis call.
///
/// None of these are fatal to the relay: the dispatcher logs them, sends
/// nothing, and releases the channel's admission gate.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("image data is not valid base64: {0}")]
    InvalidImage(#[from] base64::DecodeError),

    /// Built through `From`, which drops the request URL.
    #[error("request to analysis provider failed: {0}")]
    Transport(reqwest::Error),

    #[error("analysis provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("analysis provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode analysis response: {0}")]
    Decode(String),

    #[error("analysis provider returned no candidates")]
    EmptyResponse,

    #[error("no API key found in ${0}")]
    MissingApiKey(String),

    #[error("analysis did not finish within {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url())
    }
}

/// A data-channel payload that passed the framing check but cannot be
/// dispatched.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed JSON payload: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Failure while waiting for the `mpe_init` handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake message is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("handshake transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
