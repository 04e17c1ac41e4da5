//! Encoding analysis results for the game client.
//!
//! Exactly one message per analysed payload:
//! `{"type": "function_call", "content": [{"name": .., "args": {..}}, ..]}`
//! or `{"type": "text", "content": ".."}`. The game client adds its own
//! framing on receipt, so nothing is prefixed here.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

use super::types::{AnalysisResult, OutboundMessage};

/// Queue feeding a data channel's writer task.
pub type OutboundTx = mpsc::Sender<Message>;

/// Serialize an analysis result into its wire form.
pub fn encode_response(result: &AnalysisResult) -> serde_json::Result<String> {
    serde_json::to_string(&OutboundMessage::from(result))
}

/// Encode `result` and queue it on the data channel.
pub async fn send_response(tx: &OutboundTx, result: &AnalysisResult) -> Result<()> {
    match result {
        AnalysisResult::ActionSet(actions) => {
            let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
            info!(tools = ?names, "Executing tools");
        }
        AnalysisResult::TextResponse(text) => info!("Agent says: {}", text),
    }

    let payload = encode_response(result).context("Failed to encode analysis result")?;
    tx.send(Message::Text(payload.into()))
        .await
        .context("Data channel writer is closed")?;
    Ok(())
}
