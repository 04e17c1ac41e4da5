//! Google Gemini scene analyzer.
//!
//! One non-streaming `generateContent` call per scene: system instruction,
//! scene prompt, the screenshot as inline data, and the click tools with a
//! forced function-calling mode. Function calls in the reply become an
//! [`AnalysisResult::ActionSet`]; anything else becomes text.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Action, AnalysisResult, SceneAnalyzer, prompt, tools};
use crate::config::{AnalysisConfig, ToolMode};
use crate::error::AnalysisError;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini analyzer settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub tool_mode: ToolMode,
    pub system_prompt: String,
}

pub struct GeminiAnalyzer {
    http: reqwest::Client,
    settings: GeminiSettings,
}

impl GeminiAnalyzer {
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Resolve settings from config: the API key comes from the configured
    /// environment variable, the system prompt from file or the built-in one.
    pub fn from_config(config: &AnalysisConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AnalysisError::MissingApiKey(config.api_key_env.clone()))?;
        let system_prompt = prompt::load_system_prompt(config.system_prompt.as_deref())?;

        Ok(Self::new(GeminiSettings {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            tool_mode: config.tool_mode,
            system_prompt,
        }))
    }

    /// The key travels in a header, never in the URL, so it cannot end up
    /// in error messages.
    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model,
        )
    }

    /// Build the request body for one scene.
    ///
    /// The image is decoded first so that corrupt data fails here rather
    /// than as an opaque provider error.
    pub fn build_request(&self, scene: &Value, image_b64: &str) -> Result<Value, AnalysisError> {
        let image_b64 = image_b64.trim();
        let image_bytes = STANDARD.decode(image_b64)?;

        Ok(json!({
            "system_instruction": { "parts": [{ "text": self.settings.system_prompt }] },
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt::scene_prompt(scene) },
                    { "inline_data": {
                        "mime_type": sniff_image_mime(&image_bytes),
                        "data": image_b64,
                    } },
                ],
            }],
            "tools": [{ "function_declarations": tools::tools_google() }],
            "tool_config": {
                "function_calling_config": {
                    "mode": self.settings.tool_mode.as_str(),
                    "allowed_function_names": tools::allowed_function_names(),
                }
            },
            "generationConfig": { "temperature": self.settings.temperature },
        }))
    }
}

#[async_trait]
impl SceneAnalyzer for GeminiAnalyzer {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn analyze(&self, scene: &Value, image_b64: &str) -> Result<AnalysisResult, AnalysisError> {
        let body = self.build_request(scene, image_b64)?;
        debug!(model = %self.settings.model, "Sending scene to Gemini");

        let resp = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.settings.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let text = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::RateLimited(text));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AnalysisError::Decode(e.without_url().to_string()))?;

        if let Some(total) = data["usageMetadata"]["totalTokenCount"].as_u64() {
            info!(tokens = total, "Gemini tokens used");
        }

        parse_response(&data)
    }
}

/// Guess the screenshot MIME type from its leading bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(PNG_MAGIC) {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Turn a `generateContent` response into an analysis result.
pub fn parse_response(data: &Value) -> Result<AnalysisResult, AnalysisError> {
    let candidate = data["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or(AnalysisError::EmptyResponse)?;

    let parts = candidate["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut actions = Vec::new();
    let mut text = String::new();
    for part in parts {
        if let Some(fc) = part.get("functionCall") {
            let name = fc["name"]
                .as_str()
                .ok_or_else(|| AnalysisError::Decode("functionCall without a name".into()))?;
            let arguments = match &fc["args"] {
                Value::Object(map) => map.clone(),
                Value::Null => Default::default(),
                other => {
                    return Err(AnalysisError::Decode(format!(
                        "functionCall `{}` has non-object args: {}",
                        name, other
                    )));
                }
            };
            actions.push(Action::new(name, arguments));
        } else if let Some(t) = part["text"].as_str() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(t);
        }
    }

    if actions.is_empty() {
        Ok(AnalysisResult::TextResponse(text))
    } else {
        Ok(AnalysisResult::ActionSet(actions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn settings(base_url: &str) -> GeminiSettings {
        GeminiSettings {
            base_url: base_url.to_string(),
            model: "gemini-2.5-flash".into(),
            api_key: "test-key".into(),
            temperature: 0.0,
            tool_mode: ToolMode::Any,
            system_prompt: "be brief".into(),
        }
    }

    #[test]
    fn request_carries_image_tools_and_mode() {
        let analyzer = GeminiAnalyzer::new(settings("https://example.invalid/v1beta/"));
        let png = STANDARD.encode(b"\x89PNG\r\n\x1a\nrest");
        let body = analyzer.build_request(&json!({ "a": 1 }), &png).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert!(parts[0]["text"].as_str().unwrap().contains("\"a\": 1"));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], png.as_str());
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["tool_config"]["function_calling_config"]["mode"], "ANY");
        assert_eq!(
            body["tools"][0]["function_declarations"].as_array().unwrap().len(),
            2
        );
        assert_eq!(
            analyzer.endpoint(),
            "https://example.invalid/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn jpeg_is_the_default_mime() {
        assert_eq!(sniff_image_mime(&[0xff, 0xd8, 0xff]), "image/jpeg");
        assert_eq!(sniff_image_mime(&[]), "image/jpeg");
    }

    #[test]
    fn bad_base64_is_rejected_before_sending() {
        let analyzer = GeminiAnalyzer::new(settings("https://example.invalid"));
        let err = analyzer.build_request(&json!({}), "not base64!!").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidImage(_)));
    }

    #[test]
    fn function_calls_become_actions_in_order() {
        let data = json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "click_ui_button",
                                    "args": { "ButtonName": "Attack", "Intent": "attack" } } },
                { "functionCall": { "name": "click_screen_position",
                                    "args": { "screenX": 10, "screenY": 20, "Intent": "move" } } },
            ] } }]
        });
        let AnalysisResult::ActionSet(actions) = parse_response(&data).unwrap() else {
            panic!("expected actions");
        };
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "click_ui_button");
        assert_eq!(actions[1].arguments["screenY"], 20);
    }

    #[test]
    fn text_parts_are_joined() {
        let data = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Nothing" }, { "text": "to do" }] } }]
        });
        assert_eq!(
            parse_response(&data).unwrap(),
            AnalysisResult::TextResponse("Nothing\nto do".into())
        );
    }

    #[test]
    fn missing_candidates_is_an_error() {
        assert!(matches!(
            parse_response(&json!({ "candidates": [] })),
            Err(AnalysisError::EmptyResponse)
        ));
        assert!(matches!(
            parse_response(&json!({ "promptFeedback": {} })),
            Err(AnalysisError::EmptyResponse)
        ));
    }

    #[test]
    fn missing_key_fails_at_startup() {
        let config = AnalysisConfig {
            api_key_env: "SCENELINK_TEST_UNSET_GEMINI_KEY".into(),
            ..Default::default()
        };
        let err = GeminiAnalyzer::from_config(&config).err().expect("should fail");
        assert!(err.to_string().contains("SCENELINK_TEST_UNSET_GEMINI_KEY"));
    }

    /// Serve exactly one HTTP response on a loopback port. The receiver
    /// yields the raw request headers.
    async fn one_shot_server(
        status_line: &'static str,
        body: String,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (head_tx, head_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // Read headers, then the declared body length.
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let text = String::from_utf8_lossy(&buf);
            let head = text.split("\r\n\r\n").next().unwrap_or_default().to_string();
            let _ = head_tx.send(head);
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });
        (format!("http://{}", addr), head_rx)
    }

    #[tokio::test]
    async fn analyze_round_trip_against_local_server() {
        let reply = json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "click_ui_button",
                                    "args": { "ButtonName": "End Turn", "Intent": "pass" } } }
            ] } }],
            "usageMetadata": { "totalTokenCount": 1234 }
        });
        let (base, head) = one_shot_server("200 OK", reply.to_string()).await;
        let analyzer = GeminiAnalyzer::new(settings(&base));
        let result = analyzer
            .analyze(&json!({ "scene": "battle" }), &STANDARD.encode(b"jpeg"))
            .await
            .unwrap();
        let AnalysisResult::ActionSet(actions) = result else {
            panic!("expected actions");
        };
        assert_eq!(actions[0].arguments["ButtonName"], "End Turn");

        let head = head.await.unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("POST /models/gemini-2.5-flash:generateContent "));
        assert!(!request_line.contains("test-key"));
        assert!(head.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
    }

    #[tokio::test]
    async fn transport_errors_never_reveal_the_key() {
        // Nothing listens here once the listener is dropped.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let analyzer = GeminiAnalyzer::new(settings(&format!("http://{}", addr)));
        let err = analyzer
            .analyze(&json!({}), &STANDARD.encode(b"jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Transport(_)));
        let msg = err.to_string();
        assert!(!msg.contains("test-key"), "{}", msg);
        assert!(!msg.contains("generateContent"), "{}", msg);
    }

    #[tokio::test]
    async fn quota_errors_are_classified() {
        let (base, _) = one_shot_server(
            "429 Too Many Requests",
            json!({ "error": { "status": "RESOURCE_EXHAUSTED" } }).to_string(),
        )
        .await;
        let analyzer = GeminiAnalyzer::new(settings(&base));
        let err = analyzer
            .analyze(&json!({}), &STANDARD.encode(b"jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited(ref body) if body.contains("RESOURCE_EXHAUSTED")));
    }

    #[tokio::test]
    async fn server_errors_keep_status_and_body() {
        let (base, _) = one_shot_server("500 Internal Server Error", "{\"error\":\"boom\"}".into()).await;
        let analyzer = GeminiAnalyzer::new(settings(&base));
        let err = analyzer
            .analyze(&json!({}), &STANDARD.encode(b"jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Status { status: 500, .. }));
    }
}
