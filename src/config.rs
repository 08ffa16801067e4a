//! Configuration types for the planner and its assistant sessions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Remote model / assistant settings.
    pub assistant: AssistantConfig,
    /// Audio capture/playback settings for voice sessions.
    pub audio: AudioConfig,
}

/// Remote model endpoint and session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Bidirectional WebSocket endpoint of the generative model service.
    pub endpoint: String,
    /// Model name sent in the setup frame.
    pub model: String,
    /// API key. When empty, the variable named by `api_key_env` is read.
    pub api_key: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Prebuilt voice used for spoken replies in voice sessions.
    pub voice_name: String,
    /// Hard upper bound for a one-shot request, in milliseconds.
    pub request_timeout_ms: u64,
    /// How long to keep collecting tool calls after the first burst arrives.
    pub settle_delay_ms: u64,
    /// Gap between the setup frame and the prompt frame.
    pub prompt_delay_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent".to_owned(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_owned(),
            api_key: String::new(),
            api_key_env: "GOOGLE_AI_KEY".to_owned(),
            voice_name: "Puck".to_owned(),
            request_timeout_ms: 12_000,
            settle_delay_ms: 200,
            prompt_delay_ms: 150,
        }
    }
}

impl AssistantConfig {
    /// The configured key, falling back to the environment.
    pub fn effective_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Full connection URL with the key attached as a query parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL.
    pub fn connection_url(&self) -> crate::error::Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| crate::error::PlannerError::Config(format!("bad endpoint: {e}")))?;
        if let Some(key) = self.effective_api_key() {
            url.query_pairs_mut().append_pair("key", &key);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn prompt_delay(&self) -> Duration {
        Duration::from_millis(self.prompt_delay_ms)
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of the PCM stream sent to the model, in Hz.
    pub input_sample_rate: u32,
    /// Sample rate of the PCM stream received from the model, in Hz.
    pub output_sample_rate: u32,
    /// Samples per outbound realtime chunk (1600 = 100ms at 16kHz).
    pub chunk_samples: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            chunk_samples: 1_600,
            input_device: None,
            output_device: None,
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::PlannerError::Config(e.to_string()))
    }

    /// Load from `path` when given, else from the default path if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PlannerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/dayplan/config.toml`.
    ///
    /// `DAYPLAN_CONFIG_DIR` overrides the directory.
    pub fn default_config_path() -> PathBuf {
        if let Some(dir) = std::env::var_os("DAYPLAN_CONFIG_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        dirs::config_dir()
            .map(|d| d.join("dayplan"))
            .unwrap_or_else(|| PathBuf::from("/tmp/dayplan-config"))
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PlannerConfig::default();
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert!(config.audio.chunk_samples > 0);
        assert_eq!(config.assistant.request_timeout_ms, 12_000);
        assert!(config.assistant.settle_delay_ms < config.assistant.request_timeout_ms);
        assert!(config.assistant.endpoint.starts_with("wss://"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PlannerConfig::default();
        config.assistant.request_timeout_ms = 5_000;
        config.assistant.voice_name = "Kore".to_owned();
        config.audio.chunk_samples = 800;

        config.save_to_file(&path).unwrap();
        let loaded = PlannerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.assistant.request_timeout_ms, 5_000);
        assert_eq!(loaded.assistant.voice_name, "Kore");
        assert_eq!(loaded.audio.chunk_samples, 800);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: PlannerConfig = toml::from_str("[assistant]\nsettle_delay_ms = 50\n").unwrap();
        assert_eq!(config.assistant.settle_delay_ms, 50);
        assert_eq!(config.assistant.prompt_delay_ms, 150);
        assert_eq!(config.audio.output_sample_rate, 24_000);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = PlannerConfig::from_file(std::path::Path::new("/nonexistent/dayplan.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            PlannerConfig::from_file(&path),
            Err(crate::error::PlannerError::Config(_))
        ));
    }

    #[test]
    fn connection_url_carries_explicit_key() {
        let config = AssistantConfig {
            endpoint: "ws://127.0.0.1:9/live".to_owned(),
            api_key: "secret".to_owned(),
            ..AssistantConfig::default()
        };
        let url = config.connection_url().unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9/live?key=secret");
    }

    #[test]
    fn connection_url_rejects_garbage_endpoint() {
        let config = AssistantConfig {
            endpoint: "not a url".to_owned(),
            ..AssistantConfig::default()
        };
        assert!(config.connection_url().is_err());
    }
}
