//! Game client relay.
//!
//! The game client first connects to the handshake server and announces a
//! port. The relay then opens its own WebSocket connection back to that
//! port (the data channel), receives scene payloads on it, runs them
//! through the scene analyzer one at a time, and sends each decision back.

pub mod channel;
pub mod codec;
pub mod dispatch;
pub mod gate;
pub mod handshake;
pub mod helpers;
pub mod response;
pub mod types;

pub use dispatch::PayloadDispatcher;
pub use gate::{AdmissionGate, AdmissionPermit};
pub use handshake::HandshakeServer;
pub use types::{Action, AnalysisResult, HandshakeMessage, ScenePayload};

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::analysis::SharedAnalyzer;
use crate::config::Config;

/// Process-wide state, built once at startup and shared by every
/// connection handler.
pub struct BridgeContext {
    pub config: Config,
    pub analyzer: SharedAnalyzer,
}

impl BridgeContext {
    pub fn new(config: Config, analyzer: SharedAnalyzer) -> Self {
        Self { config, analyzer }
    }
}

pub type SharedContext = Arc<BridgeContext>;

/// Run the relay until `cancel` is triggered.
///
/// Failing to bind the handshake listener is the only error returned;
/// everything after that is logged per connection.
pub async fn run_bridge(ctx: SharedContext, cancel: CancellationToken) -> Result<()> {
    let server = HandshakeServer::bind(ctx).await?;
    server.run(cancel).await
}
