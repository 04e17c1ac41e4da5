//! Scene payload dispatch.
//!
//! Dispatch is split in two so the data channel's read loop never waits on
//! the model: [`PayloadDispatcher::admit`] runs inline, in arrival order, and
//! either drops the frame or claims the channel's admission gate;
//! [`PayloadDispatcher::analyze`] then runs the model call in its own task
//! while holding the permit, and [`PayloadDispatcher::reply`] queues the
//! result once the gate is open again.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::SharedContext;
use super::gate::{AdmissionGate, AdmissionPermit};
use super::response::{OutboundTx, send_response};
use super::types::{AnalysisResult, RawScenePayload, ScenePayload};
use crate::analysis::analyze_with_deadline;
use crate::error::PayloadError;

/// Parse and validate a candidate payload string.
///
/// Both `sceneJson` and `b64Image` must be present and non-empty. For the
/// scene, `null`, `false`, `0`, `""`, `[]` and `{}` count as empty; an image
/// string of only whitespace counts as empty.
pub fn parse_payload(candidate: &str) -> Result<ScenePayload, PayloadError> {
    let raw: RawScenePayload = serde_json::from_str(candidate)?;

    let scene_context = raw
        .scene_json
        .filter(|v| !is_empty_value(v))
        .ok_or(PayloadError::MissingField("sceneJson"))?;
    let image_data = raw
        .b64_image
        .filter(|s| !s.trim().is_empty())
        .ok_or(PayloadError::MissingField("b64Image"))?;

    Ok(ScenePayload {
        scene_context,
        image_data,
    })
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

/// A payload that won the channel's admission gate.
#[derive(Debug)]
pub struct AdmittedPayload {
    pub payload: ScenePayload,
    permit: AdmissionPermit,
}

/// Per-channel dispatcher: validation, admission, analysis, reply.
#[derive(Clone)]
pub struct PayloadDispatcher {
    ctx: SharedContext,
    gate: AdmissionGate,
    outbound: OutboundTx,
}

impl PayloadDispatcher {
    pub fn new(ctx: SharedContext, gate: AdmissionGate, outbound: OutboundTx) -> Self {
        Self {
            ctx,
            gate,
            outbound,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Validate `candidate` and try to claim the gate.
    ///
    /// Parse and validation failures are logged and never touch the gate. A
    /// busy gate drops the frame silently.
    pub fn admit(&self, candidate: &str) -> Option<AdmittedPayload> {
        let payload = match parse_payload(candidate) {
            Ok(payload) => payload,
            Err(PayloadError::MissingField(field)) => {
                warn!("Received partial payload (missing {}); skipping analysis", field);
                return None;
            }
            Err(err) => {
                // Unparseable after framing: same class as a keep-alive.
                debug!("Discarding unparseable payload: {}", err);
                return None;
            }
        };

        let Some(permit) = self.gate.try_enter() else {
            debug!("Analysis in flight; dropping frame");
            return None;
        };

        Some(AdmittedPayload { payload, permit })
    }

    /// Analyse an admitted payload.
    ///
    /// The gate is released as soon as the analyzer returns, whatever the
    /// outcome, and before any reply is queued: a frame the game client
    /// sends after seeing the reply always finds the gate open. Failures are
    /// logged and yield `None`.
    pub async fn analyze(&self, admitted: AdmittedPayload) -> Option<AnalysisResult> {
        let AdmittedPayload { payload, permit } = admitted;

        info!(
            scene_chars = payload.scene_context.to_string().len(),
            image_chars = payload.image_data.len(),
            analyzer = self.ctx.analyzer.name(),
            "Processing scene"
        );

        let outcome = analyze_with_deadline(
            self.ctx.analyzer.as_ref(),
            &payload.scene_context,
            &payload.image_data,
            self.ctx.config.analysis_timeout(),
        )
        .await;
        permit.leave();

        match outcome {
            Ok(result) => Some(result),
            Err(err) => {
                error!("Scene analysis failed: {}", err);
                None
            }
        }
    }

    /// Queue `result` for the game client. Returns whether it was queued.
    pub async fn reply(&self, result: &AnalysisResult) -> bool {
        match send_response(&self.outbound, result).await {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to send analysis result to game client: {:#}", err);
                false
            }
        }
    }

    /// Analyse an admitted payload and reply. Returns whether a reply was
    /// queued.
    pub async fn run(&self, admitted: AdmittedPayload) -> bool {
        match self.analyze(admitted).await {
            Some(result) => self.reply(&result).await,
            None => false,
        }
    }

    /// Admit and analyse inline. Returns whether the payload was admitted.
    pub async fn dispatch(&self, candidate: &str) -> bool {
        match self.admit(candidate) {
            Some(admitted) => {
                self.run(admitted).await;
                true
            }
            None => false,
        }
    }
}
