//! Prompt text sent with every scene.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

/// System instruction used when no prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You control a game by clicking on the screen. Each turn you receive a \
screenshot and a JSON description of the visible scene. Pick the single most \
useful next action and express it as a tool call. Prefer click_ui_button when \
the target is a named button; otherwise use click_screen_position with \
coordinates taken from the scene data. Always state your intent.";

/// Load the system instruction from `path`, or fall back to the built-in one.
pub fn load_system_prompt(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt {}", path.display())),
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

/// Per-request prompt: the scene JSON, pretty-printed, plus the task.
pub fn scene_prompt(scene: &Value) -> String {
    let semantic_context =
        serde_json::to_string_pretty(scene).unwrap_or_else(|_| scene.to_string());
    format!(
        "You are an autonomous agent playing a tactics game.\n\
         The current screenshot is attached, and the semantic scene data follows as JSON.\n\
         \n\
         ### Semantic Scene Data:\n\
         {semantic_context}\n\
         \n\
         ### Task:\n\
         Study the image together with the JSON and choose the best move. \
         Locate targets with the `viewportPos` and `path` fields of the JSON.\n"
    )
}
