//! Configuration management for voice-prompt.
//!
//! Both binaries read the same YAML file so the client's endpoint and
//! the server's route always agree.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prompt used when a request carries no usable `prompt` parameter.
pub const DEFAULT_PROMPT: &str = "Write a story about a magic backpack.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub route: String,
    pub default_prompt: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            route: "/generate-text".into(),
            default_prompt: DEFAULT_PROMPT.into(),
        }
    }
}

impl ServerConfig {
    /// Route path with a guaranteed leading slash.
    pub fn route_path(&self) -> String {
        if self.route.starts_with('/') {
            self.route.clone()
        } else {
            format!("/{}", self.route)
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_base: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            timeout_secs: 60,
        }
    }
}

impl GenerationConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Full endpoint URL. Derived from the server section when unset.
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    pub enabled: bool,
    pub program: String,
    /// Passed before the generated flags, e.g. `["-s", "150"]`.
    pub args: Vec<String>,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "espeak-ng".into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerBackend {
    Command,
    Whisper,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub backend: RecognizerBackend,
    /// Argv for the command backend. `{lang}` is replaced with the language tag.
    pub command: Vec<String>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::Command,
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub model: String,
    pub sample_rate: u32,
    pub silence_threshold: f32,
    pub silence_duration: f64,
    pub min_speech_duration: f64,
    pub max_duration: f64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            sample_rate: 16000,
            silence_threshold: 0.01,
            silence_duration: 1.5,
            min_speech_duration: 0.5,
            max_duration: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Preferred voice name. Falls back to the backend default when missing.
    pub voice: Option<String>,
    pub language: String,
    pub synthesizer: SynthesizerConfig,
    pub recognizer: RecognizerConfig,
    pub whisper: WhisperConfig,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: None,
            language: "en-US".into(),
            synthesizer: SynthesizerConfig::default(),
            recognizer: RecognizerConfig::default(),
            whisper: WhisperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub client: ClientConfig,
    pub speech: SpeechConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/voice-prompt/config.yaml
    /// 3. /etc/voice-prompt/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/voice-prompt/config.yaml")),
                Some(PathBuf::from("/etc/voice-prompt/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> crate::Result<Self> {
        serde_yml::from_str(contents).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Endpoint URL the client should call.
    pub fn client_endpoint(&self) -> String {
        if let Some(endpoint) = &self.client.endpoint {
            return endpoint.clone();
        }
        let host = match self.server.host.as_str() {
            "0.0.0.0" | "::" => "localhost",
            other => other,
        };
        format!("http://{host}:{}{}", self.server.port, self.server.route_path())
    }

    pub fn client_timeout_secs(&self) -> u64 {
        self.client
            .timeout_secs
            .unwrap_or(self.generation.timeout_secs + 5)
    }
}
