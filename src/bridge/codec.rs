//! Data-channel frame decoding.
//!
//! The game client's transport prepends a 4-byte connection identifier to
//! every frame it sends. It also pushes bare numeric identifier frames that
//! carry no payload. This module strips the prefix and filters out anything
//! that does not look like a JSON object. It never parses JSON itself; that
//! is left to the dispatcher.

use tokio_tungstenite::tungstenite::Message;

/// Length of the identifier the peer transport prepends to each frame.
pub const CLIENT_ID_PREFIX_LEN: usize = 4;

/// Whether a text frame still carries the 4-byte client identifier.
///
/// A text frame is treated as prefixed only when it does not already start
/// with `{` and the remainder after the prefix does. Frames that start with
/// `{` are passed through untouched, including the rare client id whose
/// first byte is `{`; such a frame fails to parse downstream and is dropped.
pub fn text_has_client_prefix(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() <= CLIENT_ID_PREFIX_LEN || starts_with_brace(bytes) {
        return false;
    }
    starts_with_brace(&bytes[CLIENT_ID_PREFIX_LEN..])
}

/// Decode one raw frame into a candidate JSON payload.
///
/// Returns `None` for control frames, frames too short to hold the prefix,
/// non-UTF-8 bodies, and anything whose first non-whitespace character is
/// not `{`.
pub fn decode_frame(frame: &Message) -> Option<String> {
    match frame {
        Message::Binary(bytes) => decode_binary(bytes),
        Message::Text(text) => decode_text(text.as_str()),
        _ => None,
    }
}

/// Binary frames always carry the identifier prefix.
pub fn decode_binary(bytes: &[u8]) -> Option<String> {
    let body = bytes.get(CLIENT_ID_PREFIX_LEN..)?;
    let text = std::str::from_utf8(body).ok()?;
    candidate(text)
}

pub fn decode_text(text: &str) -> Option<String> {
    let body = if text_has_client_prefix(text) {
        // The prefix check guarantees byte 4 is `{` or ASCII whitespace, so
        // this is a char boundary.
        &text[CLIENT_ID_PREFIX_LEN..]
    } else {
        text
    };
    candidate(body)
}

fn candidate(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn starts_with_brace(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}
