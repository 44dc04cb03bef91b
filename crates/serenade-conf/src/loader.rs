//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, GameConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/serenade/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("serenade/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("serenade.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Overlay a TOML file onto `config`.
pub fn apply_file(config: &mut GameConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Narrow a TOML integer, rejecting values the field cannot hold.
fn in_range<T: TryFrom<i64>>(key: &str, value: i64, path: &Path) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{} out of range: {}", key, value),
    })
}

/// Overlay a TOML document onto `config`.
///
/// Only keys present in the document are touched, so applying several
/// documents in sequence layers them field by field.
pub fn apply_toml(config: &mut GameConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(v) = table.get("sample_rate").and_then(|v| v.as_integer()) {
        config.sample_rate = in_range("sample_rate", v, path)?;
    }
    if let Some(v) = table.get("hop_length").and_then(|v| v.as_integer()) {
        config.hop_length = in_range("hop_length", v, path)?;
    }
    if let Some(v) = table.get("confidence_threshold").and_then(as_f64) {
        config.confidence_threshold = v;
    }
    if let Some(labels) = table.get("emotion_labels").and_then(|v| v.as_array()) {
        config.emotion_labels = labels
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect();
    }
    if let Some(v) = table.get("history_limit").and_then(|v| v.as_integer()) {
        config.history_limit = in_range("history_limit", v, path)?;
    }

    if let Some(dialogue) = table.get("dialogue").and_then(|v| v.as_table()) {
        if let Some(v) = dialogue.get("model").and_then(|v| v.as_str()) {
            config.dialogue.model = v.to_string();
        }
        if let Some(v) = dialogue.get("base_url").and_then(|v| v.as_str()) {
            config.dialogue.base_url = v.to_string();
        }
        if let Some(v) = dialogue.get("timeout_secs").and_then(|v| v.as_integer()) {
            config.dialogue.timeout_secs = v.max(1) as u64;
        }
        if let Some(v) = dialogue.get("system_prompt").and_then(|v| v.as_str()) {
            config.dialogue.system_prompt = Some(v.to_string());
        }
    }

    if let Some(emotion) = table.get("emotion").and_then(|v| v.as_table()) {
        if let Some(v) = emotion.get("model_path").and_then(|v| v.as_str()) {
            config.emotion.model_path = Some(expand_path(v));
        }
    }

    if let Some(broadcast) = table.get("broadcast").and_then(|v| v.as_table()) {
        if let Some(v) = broadcast.get("enabled").and_then(|v| v.as_bool()) {
            config.broadcast.enabled = v;
        }
        if let Some(v) = broadcast.get("address").and_then(|v| v.as_str()) {
            config.broadcast.address = v.to_string();
        }
        if let Some(v) = broadcast.get("port").and_then(|v| v.as_integer()) {
            config.broadcast.port = in_range("broadcast.port", v, path)?;
        }
        if let Some(v) = broadcast.get("prefix").and_then(|v| v.as_str()) {
            config.broadcast.prefix = v.trim_end_matches('/').to_string();
        }
    }

    if let Some(archive) = table.get("archive").and_then(|v| v.as_table()) {
        if let Some(v) = archive.get("path").and_then(|v| v.as_str()) {
            config.archive.path = Some(expand_path(v));
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = Some(v.to_string());
        }
    }

    Ok(())
}

/// TOML writes `1.0` back as `1` when it came from a formatted f64.
fn as_f64(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut GameConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("SERENADE_SAMPLE_RATE") {
        if let Ok(rate) = v.parse() {
            config.sample_rate = rate;
            sources.env_overrides.push("SERENADE_SAMPLE_RATE".to_string());
        }
    }
    if let Ok(v) = env::var("SERENADE_HOP_LENGTH") {
        if let Ok(hop) = v.parse() {
            config.hop_length = hop;
            sources.env_overrides.push("SERENADE_HOP_LENGTH".to_string());
        }
    }
    if let Ok(v) = env::var("SERENADE_CONFIDENCE_THRESHOLD") {
        if let Ok(threshold) = v.parse() {
            config.confidence_threshold = threshold;
            sources.env_overrides.push("SERENADE_CONFIDENCE_THRESHOLD".to_string());
        }
    }
    if let Ok(v) = env::var("SERENADE_HISTORY_LIMIT") {
        if let Ok(limit) = v.parse() {
            config.history_limit = limit;
            sources.env_overrides.push("SERENADE_HISTORY_LIMIT".to_string());
        }
    }

    // Dialogue backend
    if let Ok(v) = env::var("SERENADE_DIALOGUE_MODEL") {
        config.dialogue.model = v;
        sources.env_overrides.push("SERENADE_DIALOGUE_MODEL".to_string());
    }
    // Same variable the ollama CLI reads
    if let Ok(v) = env::var("OLLAMA_HOST") {
        config.dialogue.base_url = normalize_ollama_host(&v);
        sources.env_overrides.push("OLLAMA_HOST".to_string());
    }

    if let Ok(v) = env::var("EMOTION_MODEL_PATH") {
        config.emotion.model_path = Some(expand_path(&v));
        sources.env_overrides.push("EMOTION_MODEL_PATH".to_string());
    }

    // Broadcast
    if let Ok(v) = env::var("SERENADE_BROADCAST_ENABLED") {
        if let Ok(enabled) = v.parse() {
            config.broadcast.enabled = enabled;
            sources.env_overrides.push("SERENADE_BROADCAST_ENABLED".to_string());
        }
    }
    if let Ok(v) = env::var("SERENADE_BROADCAST_ADDRESS") {
        config.broadcast.address = v;
        sources.env_overrides.push("SERENADE_BROADCAST_ADDRESS".to_string());
    }
    if let Ok(v) = env::var("SERENADE_BROADCAST_PORT") {
        if let Ok(port) = v.parse() {
            config.broadcast.port = port;
            sources.env_overrides.push("SERENADE_BROADCAST_PORT".to_string());
        }
    }

    if let Ok(v) = env::var("SERENADE_ARCHIVE_PATH") {
        config.archive.path = Some(expand_path(&v));
        sources.env_overrides.push("SERENADE_ARCHIVE_PATH".to_string());
    }

    // Telemetry
    if let Ok(v) = env::var("SERENADE_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("SERENADE_OTLP_ENDPOINT".to_string());
    } else if let Ok(v) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("SERENADE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("SERENADE_LOG_LEVEL".to_string());
    } else if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// `OLLAMA_HOST` is often a bare `host:port`.
pub fn normalize_ollama_host(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
