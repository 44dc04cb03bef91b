//! Config sections for the optional collaborators.
//!
//! Top-level analysis settings live directly on `GameConfig`; everything
//! that talks to another process (dialogue backend, broadcast target,
//! telemetry collector) or touches the filesystem gets its own table.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Text-generation backend binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Model name passed to the backend.
    /// Default: llama3
    #[serde(default = "DialogueConfig::default_model")]
    pub model: String,

    /// Base URL of the Ollama server.
    /// Default: http://localhost:11434
    #[serde(default = "DialogueConfig::default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds. Local models can be slow.
    /// Default: 120
    #[serde(default = "DialogueConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Replaces the built-in persona prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl DialogueConfig {
    fn default_model() -> String {
        "llama3".to_string()
    }

    fn default_base_url() -> String {
        "http://localhost:11434".to_string()
    }

    fn default_timeout_secs() -> u64 {
        120
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            base_url: Self::default_base_url(),
            timeout_secs: Self::default_timeout_secs(),
            system_prompt: None,
        }
    }
}

/// Emotion model location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionConfig {
    /// JSON weights file. Built-in weights are used when unset.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

/// OSC bridge to an external real-time engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Default: false
    #[serde(default)]
    pub enabled: bool,

    /// Default: 127.0.0.1
    #[serde(default = "BroadcastConfig::default_address")]
    pub address: String,

    /// Default: 7000
    #[serde(default = "BroadcastConfig::default_port")]
    pub port: u16,

    /// Namespace for every OSC address.
    /// Default: /music
    #[serde(default = "BroadcastConfig::default_prefix")]
    pub prefix: String,
}

impl BroadcastConfig {
    fn default_address() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        7000
    }

    fn default_prefix() -> String {
        "/music".to_string()
    }

    /// `address:port` for socket APIs.
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: Self::default_address(),
            port: Self::default_port(),
            prefix: Self::default_prefix(),
        }
    }
}

/// JSON-lines result archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive is disabled when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging and tracing export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// EnvFilter directive.
    /// Default: info,serenade=debug
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Console logging only when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info,serenade=debug".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_target_joins_address_and_port() {
        let config = BroadcastConfig {
            address: "10.0.0.5".into(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.target(), "10.0.0.5:9000");
    }

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(DialogueConfig::default().base_url, "http://localhost:11434");
        assert_eq!(BroadcastConfig::default().prefix, "/music");
        assert!(!BroadcastConfig::default().enabled);
        assert!(TelemetryConfig::default().otlp_endpoint.is_none());
    }
}
