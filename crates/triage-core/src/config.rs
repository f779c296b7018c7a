use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonschema::validator_for;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

pub const DEFAULT_MODEL: &str = "gpt-5-nano";
pub const DEFAULT_ENDPOINT_PATH: &str = "/_triage/analyze";
const DEFAULT_CONFIG_PATH: &str = "configs/triage.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("config schema: {0}")]
    Schema(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Static settings for the diagnostics layer. Built once at startup and
/// shared read-only afterwards.
#[derive(Clone, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Provider API key; analysis requests fail fast without one.
    pub api_key: Option<String>,
    /// Model identifier sent to the provider and shown in the widget.
    pub model: String,
    /// Master switch for interception.
    pub enabled: bool,
    /// Number of trailing log lines captured with each error.
    #[schemars(range(min = 1))]
    pub log_lines: u32,
    /// Base URL of the model provider (no trailing `/v1/...`).
    pub api_base_url: String,
    /// Upper bound for one outbound analysis call.
    #[schemars(range(min = 1))]
    pub request_timeout_secs: u64,
    pub logs_dir: PathBuf,
    pub log_file: String,
    /// Route the widget posts to.
    pub endpoint_path: String,
    /// The widget is spliced in front of the first case-insensitive match.
    pub inject_marker: String,
    /// Responses larger than this are passed through untouched.
    #[schemars(range(min = 1))]
    pub max_body_bytes: usize,
    /// Path extensions (without the dot) that are never intercepted.
    pub ignore_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            enabled: true,
            log_lines: 50,
            api_base_url: "https://api.openai.com".to_string(),
            request_timeout_secs: 30,
            logs_dir: PathBuf::from("logs"),
            log_file: "development.log".to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            inject_marker: "</body>".to_string(),
            max_body_bytes: 8 * 1024 * 1024,
            ignore_extensions: Vec::new(),
        }
    }
}

// Hand-written so the API key never lands in logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .field("log_lines", &self.log_lines)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("logs_dir", &self.logs_dir)
            .field("log_file", &self.log_file)
            .field("endpoint_path", &self.endpoint_path)
            .field("inject_marker", &self.inject_marker)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("ignore_extensions", &self.ignore_extensions)
            .finish()
    }
}

impl Config {
    /// Trimmed API key, `None` when unset or blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join(&self.log_file)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_lines == 0 {
            return Err(ConfigError::Invalid("log_lines must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if !self.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "endpoint_path must start with '/': {}",
                self.endpoint_path
            )));
        }
        if self.inject_marker.is_empty() {
            return Err(ConfigError::Invalid("inject_marker must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        Ok(())
    }

    /// Apply `TRIAGE_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(key) = env_nonempty("TRIAGE_OPENAI_API_KEY").or_else(|| env_nonempty("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = env_nonempty("TRIAGE_MODEL") {
            self.model = model;
        }
        if let Some(raw) = env_nonempty("TRIAGE_ENABLED") {
            self.enabled = parse_bool(&raw).ok_or(ConfigError::InvalidEnv {
                key: "TRIAGE_ENABLED",
                value: raw,
            })?;
        }
        if let Some(raw) = env_nonempty("TRIAGE_LOG_LINES") {
            self.log_lines = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "TRIAGE_LOG_LINES",
                value: raw,
            })?;
        }
        if let Some(url) = env_nonempty("TRIAGE_OPENAI_BASE_URL") {
            self.api_base_url = url;
        }
        Ok(())
    }
}

/// Returns the JSON schema describing the configuration file.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null)
}

/// Load and validate a TOML configuration file. Environment overrides are not
/// applied here; see [`resolve_config`].
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    let raw: toml::Value = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: display.clone(),
        source,
    })?;
    let json_value =
        serde_json::to_value(&raw).map_err(|err| ConfigError::Schema(err.to_string()))?;
    let validator = validator_for(&config_schema_json())
        .map_err(|err| ConfigError::Schema(err.to_string()))?;
    let validation_errors: Vec<String> = validator
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Schema(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Discover, load and finalize the process configuration.
///
/// Looks at `TRIAGE_CONFIG` first, then `configs/triage.toml`; falls back to
/// defaults when neither exists. Environment overrides are applied last.
pub fn resolve_config() -> Result<Config, ConfigError> {
    let (path, source) = match env_nonempty("TRIAGE_CONFIG") {
        Some(explicit) => (Some(PathBuf::from(explicit)), "env"),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_PATH);
            (candidate.exists().then_some(candidate), "search")
        }
    };
    let mut cfg = match path {
        Some(path) => {
            let cfg = load_config(&path)?;
            info!(target: "triage::config", path = %path.display(), source, "loaded config");
            cfg
        }
        None => {
            info!(target: "triage::config", "no config file found; using defaults");
            Config::default()
        }
    };
    cfg.apply_env_overrides()?;
    cfg.validate()?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
