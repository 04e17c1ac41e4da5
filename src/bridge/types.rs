//! Wire and data types shared by the handshake server and the data channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type tag the game client uses for its handshake message.
pub const INIT_MESSAGE_TYPE: &str = "mpe_init";

// ── Handshake ───────────────────────────────────────────────────────────────

/// Inbound handshake: `{"type": "mpe_init", "port": <int>}`.
///
/// Both fields are optional at the serde level so that unrelated JSON
/// messages still decode and can be skipped instead of failing the
/// connection.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeMessage {
    #[serde(rename = "type", default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub port: Option<Value>,
}

impl HandshakeMessage {
    /// Whether this message carries the initialization tag.
    pub fn is_init(&self) -> bool {
        self.msg_type.as_deref() == Some(INIT_MESSAGE_TYPE)
    }

    /// The announced callback port, if it is a positive integer that fits a
    /// TCP port.
    pub fn callback_port(&self) -> Option<u16> {
        let port = self.port.as_ref()?.as_u64()?;
        u16::try_from(port).ok().filter(|p| *p > 0)
    }
}

/// Reply sent once a valid handshake has been received.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeAck {
    pub status: &'static str,
}

impl HandshakeAck {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

// ── Data channel payloads ───────────────────────────────────────────────────

/// Scene payload as sent by the game client on the data channel.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScenePayload {
    #[serde(rename = "sceneJson", default)]
    pub scene_json: Option<Value>,
    #[serde(rename = "b64Image", default)]
    pub b64_image: Option<String>,
}

/// A validated scene payload: both fields present and non-empty.
#[derive(Debug, Clone)]
pub struct ScenePayload {
    pub scene_context: Value,
    pub image_data: String,
}

// ── Analysis results ────────────────────────────────────────────────────────

/// One action proposed by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(rename = "args", default)]
    pub arguments: Map<String, Value>,
}

impl Action {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one analysis call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    /// The model produced callable actions, in order.
    ActionSet(Vec<Action>),
    /// The model answered with free text.
    TextResponse(String),
}

/// Outbound message on the data channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    FunctionCall(&'a [Action]),
    Text(&'a str),
}

impl<'a> From<&'a AnalysisResult> for OutboundMessage<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        match result {
            AnalysisResult::ActionSet(actions) => OutboundMessage::FunctionCall(actions),
            AnalysisResult::TextResponse(text) => OutboundMessage::Text(text),
        }
    }
}
