use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest frame size that still fits a high-resolution screenshot plus
/// scene data.
pub const MIN_FRAME_BYTES: usize = 10_000_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub handshake: HandshakeConfig,
    pub data_channel: DataChannelConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Local address the handshake server binds to (`host:port` or `ws://host:port`).
    pub listen: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8765".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataChannelConfig {
    /// Host the game client listens on for the data channel.
    pub host: String,
    /// Path component of the data-channel URL.
    pub path: String,
    /// Maximum accepted message and frame size.
    pub max_frame_bytes: usize,
    /// Pause after each completed dispatch before the gate reopens.
    pub settle_delay_ms: u64,
}

impl Default for DataChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            path: "sus-agent-channel".to_string(),
            max_frame_bytes: 16 * 1024 * 1024,
            settle_delay_ms: 50,
        }
    }
}

/// Which scene analyzer backs the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisProvider {
    #[default]
    Google,
    /// Answers every payload with "No action"; needs no credentials.
    Noop,
}

/// Function-calling mode sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolMode {
    /// The model must call one of the declared tools.
    #[default]
    Any,
    /// The model may answer with text instead.
    Auto,
}

impl ToolMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider: AnalysisProvider,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the provider API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub tool_mode: ToolMode,
    /// Optional file with the system instruction. A built-in prompt is used
    /// when unset.
    pub system_prompt: Option<PathBuf>,
    /// Upper bound on a single analysis call. Unset means no deadline.
    pub timeout_secs: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: AnalysisProvider::Google,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.0,
            tool_mode: ToolMode::Any,
            system_prompt: None,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Default location of the config file: `~/.scenelink/config.toml`.
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".scenelink").join("config.toml")
    }

    /// Load configuration from file, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        let config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_channel.max_frame_bytes < MIN_FRAME_BYTES {
            bail!(
                "data_channel.max_frame_bytes is {} but must be at least {}",
                self.data_channel.max_frame_bytes,
                MIN_FRAME_BYTES,
            );
        }
        if self.data_channel.host.trim().is_empty() {
            bail!("data_channel.host must not be empty");
        }
        if self.analysis.timeout_secs == Some(0) {
            bail!("analysis.timeout_secs must be positive when set");
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.data_channel.settle_delay_ms)
    }

    pub fn analysis_timeout(&self) -> Option<Duration> {
        self.analysis.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_game_client() {
        let config = Config::default();
        assert_eq!(config.handshake.listen, "127.0.0.1:8765");
        assert_eq!(config.data_channel.path, "sus-agent-channel");
        assert!(config.data_channel.max_frame_bytes >= MIN_FRAME_BYTES);
        assert_eq!(config.analysis.tool_mode, ToolMode::Any);
        assert!(config.analysis_timeout().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.analysis.model, "gemini-2.5-flash");
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[handshake]
listen = "127.0.0.1:9999"

[analysis]
provider = "noop"
tool_mode = "AUTO"
timeout_secs = 30
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.handshake.listen, "127.0.0.1:9999");
        assert_eq!(config.analysis.provider, AnalysisProvider::Noop);
        assert_eq!(config.analysis.tool_mode, ToolMode::Auto);
        assert_eq!(config.analysis_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.data_channel.settle_delay_ms, 50);
    }

    #[test]
    fn small_frame_limit_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[data_channel]\nmax_frame_bytes = 65536").unwrap();
        let err = Config::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("max_frame_bytes"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[handshake\nlisten = ").unwrap();
        assert!(Config::load(Some(file.path().to_path_buf())).is_err());
    }
}
