//! Configuration loading for Serenade.
//!
//! `GameConfig` is loaded once at process start and is read-only
//! afterwards. Nothing reloads it; components receive what they need by
//! value or shared reference at construction time.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, field by field):
//! 1. `/etc/serenade/config.toml` (system)
//! 2. `~/.config/serenade/config.toml` (user)
//! 3. `./serenade.toml` (local override, replaced by `--config` when given)
//! 4. Environment variables (`SERENADE_*`, `OLLAMA_HOST`, `EMOTION_MODEL_PATH`)
//!
//! # Example Config
//!
//! ```toml
//! sample_rate = 22050
//! hop_length = 512
//! confidence_threshold = 0.5
//! emotion_labels = ["joyful", "melancholic", "tense", "calm"]
//! history_limit = 6
//!
//! [dialogue]
//! model = "llama3"
//! base_url = "http://localhost:11434"
//!
//! [emotion]
//! model_path = "~/.local/share/serenade/emotion.json"
//!
//! [broadcast]
//! enabled = true
//! address = "127.0.0.1"
//! port = 7000
//!
//! [archive]
//! path = "~/.local/share/serenade/results.jsonl"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{ArchiveConfig, BroadcastConfig, DialogueConfig, EmotionConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide Serenade configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Analysis sample rate; decoded audio is resampled to this.
    /// Default: 22050
    #[serde(default = "GameConfig::default_sample_rate")]
    pub sample_rate: u32,

    /// STFT hop in samples.
    /// Default: 512
    #[serde(default = "GameConfig::default_hop_length")]
    pub hop_length: usize,

    /// Emotion predictions strictly below this are dropped.
    /// Default: 0.5
    #[serde(default = "GameConfig::default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Ordered label set the classifier distributes over.
    #[serde(default = "GameConfig::default_emotion_labels")]
    pub emotion_labels: Vec<String>,

    /// Dialogue turns retained between requests.
    /// Default: 6
    #[serde(default = "GameConfig::default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub dialogue: DialogueConfig,

    #[serde(default)]
    pub emotion: EmotionConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GameConfig {
    fn default_sample_rate() -> u32 {
        22050
    }

    fn default_hop_length() -> usize {
        512
    }

    fn default_confidence_threshold() -> f64 {
        0.5
    }

    fn default_emotion_labels() -> Vec<String> {
        ["joyful", "melancholic", "tense", "calm"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn default_history_limit() -> usize {
        6
    }

    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = GameConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Parse a single TOML document on top of the compiled defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config = GameConfig::default();
        loader::apply_toml(&mut config, contents, Path::new("<inline>"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.emotion_labels.is_empty() {
            return Err(ConfigError::Invalid("emotion_labels must not be empty".into()));
        }
        for (i, label) in self.emotion_labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(ConfigError::Invalid("emotion label must not be blank".into()));
            }
            if self.emotion_labels[..i].contains(label) {
                return Err(ConfigError::Invalid(format!("duplicate emotion label: {label}")));
            }
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.hop_length == 0 {
            return Err(ConfigError::Invalid("hop_length must be positive".into()));
        }
        if !self.broadcast.prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "broadcast.prefix must start with '/', got {:?}",
                self.broadcast.prefix
            )));
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so optional fields show up as comments
        let mut output = String::new();

        output.push_str("# Serenade Configuration\n\n");
        output.push_str(&format!("sample_rate = {}\n", self.sample_rate));
        output.push_str(&format!("hop_length = {}\n", self.hop_length));
        output.push_str(&format!(
            "confidence_threshold = {}\n",
            self.confidence_threshold
        ));
        let labels: Vec<String> = self
            .emotion_labels
            .iter()
            .map(|l| quoted(l))
            .collect();
        output.push_str(&format!("emotion_labels = [{}]\n", labels.join(", ")));
        output.push_str(&format!("history_limit = {}\n", self.history_limit));

        output.push_str("\n[dialogue]\n");
        output.push_str(&format!("model = {}\n", quoted(&self.dialogue.model)));
        output.push_str(&format!("base_url = {}\n", quoted(&self.dialogue.base_url)));
        output.push_str(&format!("timeout_secs = {}\n", self.dialogue.timeout_secs));
        match &self.dialogue.system_prompt {
            Some(prompt) => output.push_str(&format!("system_prompt = {}\n", quoted(prompt))),
            None => output.push_str("# system_prompt = \"...\"\n"),
        }

        output.push_str("\n[emotion]\n");
        push_optional_path(&mut output, "model_path", self.emotion.model_path.as_deref());

        output.push_str("\n[broadcast]\n");
        output.push_str(&format!("enabled = {}\n", self.broadcast.enabled));
        output.push_str(&format!("address = {}\n", quoted(&self.broadcast.address)));
        output.push_str(&format!("port = {}\n", self.broadcast.port));
        output.push_str(&format!("prefix = {}\n", quoted(&self.broadcast.prefix)));

        output.push_str("\n[archive]\n");
        push_optional_path(&mut output, "path", self.archive.path.as_deref());

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {}\n", quoted(&self.telemetry.log_level)));
        match &self.telemetry.otlp_endpoint {
            Some(endpoint) => output.push_str(&format!("otlp_endpoint = {}\n", quoted(endpoint))),
            None => output.push_str("# otlp_endpoint = \"127.0.0.1:4317\"\n"),
        }

        output
    }
}

/// A TOML basic or literal string, escaped as needed.
fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn push_optional_path(output: &mut String, key: &str, path: Option<&Path>) {
    match path {
        Some(p) => output.push_str(&format!("{} = {}\n", key, quoted(&p.display().to_string()))),
        None => output.push_str(&format!("# {} = \"...\"\n", key)),
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            sample_rate: Self::default_sample_rate(),
            hop_length: Self::default_hop_length(),
            confidence_threshold: Self::default_confidence_threshold(),
            emotion_labels: Self::default_emotion_labels(),
            history_limit: Self::default_history_limit(),
            dialogue: DialogueConfig::default(),
            emotion: EmotionConfig::default(),
            broadcast: BroadcastConfig::default(),
            archive: ArchiveConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
