//! Actions the model may ask the game client to perform.
//!
//! The relay never executes these; it only declares them to the model and
//! forwards whatever calls come back.

use serde_json::{Value, json};

/// One parameter of a declared tool.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema type: "string", "number", ...
    pub param_type: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ToolParam>,
}

pub const CLICK_UI_BUTTON: &str = "click_ui_button";
pub const CLICK_SCREEN_POSITION: &str = "click_screen_position";

fn click_ui_button() -> ToolDef {
    ToolDef {
        name: CLICK_UI_BUTTON,
        description: "Press the UI button with the given name.",
        parameters: vec![
            ToolParam {
                name: "ButtonName",
                description: "Name of the button to press.",
                param_type: "string",
                required: true,
            },
            ToolParam {
                name: "AncestorName",
                description: "Name of a parent object of the button. Use it to \
                              disambiguate when several buttons share ButtonName.",
                param_type: "string",
                required: false,
            },
            ToolParam {
                name: "Intent",
                description: "What pressing the button is meant to achieve.",
                param_type: "string",
                required: true,
            },
        ],
    }
}

fn click_screen_position() -> ToolDef {
    ToolDef {
        name: CLICK_SCREEN_POSITION,
        description: "Click a screen position given in pixels. (0, 0) is the top-left corner.",
        parameters: vec![
            ToolParam {
                name: "screenX",
                description: "Pixels from the left edge of the screen.",
                param_type: "number",
                required: true,
            },
            ToolParam {
                name: "screenY",
                description: "Pixels from the top edge of the screen.",
                param_type: "number",
                required: true,
            },
            ToolParam {
                name: "Intent",
                description: "What the click is meant to achieve.",
                param_type: "string",
                required: true,
            },
        ],
    }
}

/// All declared tools, in declaration order.
pub fn all_tools() -> Vec<ToolDef> {
    vec![click_screen_position(), click_ui_button()]
}

/// Names the model is allowed to call.
pub fn allowed_function_names() -> Vec<&'static str> {
    all_tools().iter().map(|t| t.name).collect()
}

fn params_to_json_schema(params: &[ToolParam]) -> (Value, Value) {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for p in params {
        properties.insert(
            p.name.to_string(),
            json!({ "type": p.param_type, "description": p.description }),
        );
        if p.required {
            required.push(json!(p.name));
        }
    }

    (Value::Object(properties), Value::Array(required))
}

/// Tool declarations in Gemini `function_declarations` format.
pub fn tools_google() -> Vec<Value> {
    all_tools()
        .iter()
        .map(|t| {
            let (properties, required) = params_to_json_schema(&t.parameters);
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            })
        })
        .collect()
}
