// ── scenelink ───────────────────────────────────────────────────────────────
//
// Relay between a game client's scene exporter and a vision-capable model:
// handshake, data channel, frame codec, admission control, and the analysis
// collaborators behind them.

pub mod analysis;
pub mod args;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;

pub use bridge::{BridgeContext, run_bridge};
pub use config::Config;
