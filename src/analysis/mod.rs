//! Scene analysis collaborators.
//!
//! The relay only knows the [`SceneAnalyzer`] trait: scene JSON plus a
//! base64 screenshot in, an [`AnalysisResult`] out. The Gemini client is the
//! production implementation; [`NoopAnalyzer`] lets the relay run without
//! credentials, and tests substitute their own.

pub mod gemini;
pub mod prompt;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::{AnalysisConfig, AnalysisProvider};
use crate::error::AnalysisError;

pub use crate::bridge::types::{Action, AnalysisResult};
pub use gemini::GeminiAnalyzer;

/// External reasoning call over one scene snapshot.
///
/// Implementations may take seconds and may fail; they are never retried.
#[async_trait]
pub trait SceneAnalyzer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        scene: &Value,
        image_b64: &str,
    ) -> std::result::Result<AnalysisResult, AnalysisError>;
}

/// Analyzer shared by every data channel in the process.
pub type SharedAnalyzer = Arc<dyn SceneAnalyzer>;

/// Analyzer that never proposes an action.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalyzer;

#[async_trait]
impl SceneAnalyzer for NoopAnalyzer {
    fn name(&self) -> &str {
        "noop"
    }

    async fn analyze(
        &self,
        _scene: &Value,
        _image_b64: &str,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        Ok(AnalysisResult::TextResponse("No action".to_string()))
    }
}

/// Build the analyzer selected in the config.
pub fn from_config(config: &AnalysisConfig) -> Result<SharedAnalyzer> {
    match config.provider {
        AnalysisProvider::Google => Ok(Arc::new(GeminiAnalyzer::from_config(config)?)),
        AnalysisProvider::Noop => Ok(Arc::new(NoopAnalyzer)),
    }
}

/// Run one analysis, bounded by `deadline` when one is configured.
pub async fn analyze_with_deadline(
    analyzer: &dyn SceneAnalyzer,
    scene: &Value,
    image_b64: &str,
    deadline: Option<Duration>,
) -> std::result::Result<AnalysisResult, AnalysisError> {
    match deadline {
        None => analyzer.analyze(scene, image_b64).await,
        Some(limit) => tokio::time::timeout(limit, analyzer.analyze(scene, image_b64))
            .await
            .map_err(|_| AnalysisError::Timeout(limit.as_secs()))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Stalled;

    #[async_trait]
    impl SceneAnalyzer for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn analyze(
            &self,
            _scene: &Value,
            _image_b64: &str,
        ) -> std::result::Result<AnalysisResult, AnalysisError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn noop_answers_with_text() {
        let result = NoopAnalyzer.analyze(&json!({}), "AA==").await.unwrap();
        assert_eq!(result, AnalysisResult::TextResponse("No action".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_a_hung_call_into_timeout() {
        let err = analyze_with_deadline(&Stalled, &json!({}), "AA==", Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(5)));
    }

    #[tokio::test]
    async fn no_deadline_passes_through() {
        let result = analyze_with_deadline(&NoopAnalyzer, &json!({}), "AA==", None)
            .await
            .unwrap();
        assert!(matches!(result, AnalysisResult::TextResponse(_)));
    }

    #[test]
    fn noop_provider_needs_no_key() {
        let config = AnalysisConfig {
            provider: AnalysisProvider::Noop,
            api_key_env: "SCENELINK_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let analyzer = from_config(&config).unwrap();
        assert_eq!(analyzer.name(), "noop");
    }
}
