//! TOML Configuration File Support
//!
//! Configuration for the chat client, read from
//! `~/.config/streamchat/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:3000"
//! stream_path = "/api/chat/stream"
//! connect_timeout_ms = 10000
//!
//! [server.headers]
//! X-Client = "streamchat"
//!
//! [chat]
//! default_model = "gpt-4"
//! event_buffer = 100
//!
//! [storage]
//! dir = "/home/me/.local/share/streamchat"
//! ```
//!
//! # Environment Variables
//!
//! | Variable                     | Overrides                    |
//! |------------------------------|------------------------------|
//! | `STREAMCHAT_API_BASE_URL`    | `server.base_url`            |
//! | `STREAMCHAT_STREAM_PATH`     | `server.stream_path`         |
//! | `STREAMCHAT_CONNECT_TIMEOUT` | `server.connect_timeout_ms`  |
//! | `STREAMCHAT_DEFAULT_MODEL`   | `chat.default_model`         |
//! | `STREAMCHAT_STORAGE_DIR`     | `storage.dir`                |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streaming::DEFAULT_EVENT_BUFFER;

/// Default API server
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default path of the streaming chat endpoint
pub const DEFAULT_STREAM_PATH: &str = "/api/chat/stream";

/// Default connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4";

const ENV_BASE_URL: &str = "STREAMCHAT_API_BASE_URL";
const ENV_STREAM_PATH: &str = "STREAMCHAT_STREAM_PATH";
const ENV_CONNECT_TIMEOUT: &str = "STREAMCHAT_CONNECT_TIMEOUT";
const ENV_DEFAULT_MODEL: &str = "STREAMCHAT_DEFAULT_MODEL";
const ENV_STORAGE_DIR: &str = "STREAMCHAT_STORAGE_DIR";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from (highest layer applied)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// API server base URL
    pub base_url: Option<String>,
    /// Path of the streaming endpoint
    pub stream_path: Option<String>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Model selected at startup
    pub default_model: Option<String>,
    /// Capacity of the per-session event channel
    pub event_buffer: Option<usize>,
}

/// `[storage]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageToml {
    /// Directory holding the conversation file
    pub dir: Option<PathBuf>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigToml {
    /// Server section
    pub server: ServerToml,
    /// Chat section
    pub chat: ChatToml,
    /// Storage section
    pub storage: StorageToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// API server base URL
    pub base_url: String,
    /// Path of the streaming endpoint
    pub stream_path: String,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            headers: BTreeMap::new(),
        }
    }
}

/// Chat settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Model selected at startup
    pub default_model: String,
    /// Capacity of the per-session event channel
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Storage settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding the conversation file
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Resolved client configuration
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Server settings
    pub server: ServerConfig,
    /// Chat settings
    pub chat: ChatConfig,
    /// Storage settings
    pub storage: StorageConfig,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Config {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Full URL of the streaming endpoint
    #[must_use]
    pub fn stream_endpoint(&self) -> String {
        let base = self.server.base_url.trim_end_matches('/');
        let path = self.server.stream_path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.server.connect_timeout_ms)
    }

    /// Check value constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a base URL that is not
    /// http(s), or a zero event buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.server.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "server.base_url must start with http:// or https://, got {base_url:?}"
            )));
        }
        if self.chat.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "chat.event_buffer must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/streamchat/config.toml` or
/// `~/.config/streamchat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("streamchat").join("config.toml"))
}

/// Default directory for stored conversations
#[must_use]
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("streamchat"))
        .unwrap_or_else(|| PathBuf::from(".streamchat"))
}

/// Load configuration from the default path, environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the
/// resulting values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut Config, toml: ConfigToml) {
    if let Some(base_url) = toml.server.base_url {
        config.server.base_url = base_url;
    }
    if let Some(path) = toml.server.stream_path {
        config.server.stream_path = path;
    }
    if let Some(timeout) = toml.server.connect_timeout_ms {
        config.server.connect_timeout_ms = timeout;
    }
    config.server.headers.extend(toml.server.headers);

    if let Some(model) = toml.chat.default_model {
        config.chat.default_model = model;
    }
    if let Some(buffer) = toml.chat.event_buffer {
        config.chat.event_buffer = buffer;
    }

    if let Some(dir) = toml.storage.dir {
        config.storage.dir = dir;
    }
}

fn apply_env_config(config: &mut Config) {
    if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
        config.server.base_url = base_url;
        config.source = ConfigSource::Env;
    }
    if let Ok(path) = std::env::var(ENV_STREAM_PATH) {
        config.server.stream_path = path;
        config.source = ConfigSource::Env;
    }
    if let Ok(timeout) = std::env::var(ENV_CONNECT_TIMEOUT) {
        match timeout.parse::<u64>() {
            Ok(ms) => {
                config.server.connect_timeout_ms = ms;
                config.source = ConfigSource::Env;
            }
            Err(_) => {
                tracing::warn!(value = %timeout, "Ignoring invalid {ENV_CONNECT_TIMEOUT}");
            }
        }
    }
    if let Ok(model) = std::env::var(ENV_DEFAULT_MODEL) {
        config.chat.default_model = model;
        config.source = ConfigSource::Env;
    }
    if let Ok(dir) = std::env::var(ENV_STORAGE_DIR) {
        config.storage.dir = PathBuf::from(dir);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,
    /// Default model override
    pub default_model: Option<String>,
    /// Storage directory override
    pub storage_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set storage directory override
    #[must_use]
    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = Some(dir);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override is invalid.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if self.base_url.is_some() || self.default_model.is_some() || self.storage_dir.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref base_url) = self.base_url {
            config.server.base_url.clone_from(base_url);
        }
        if let Some(ref model) = self.default_model {
            config.chat.default_model.clone_from(model);
        }
        if let Some(ref dir) = self.storage_dir {
            config.storage.dir.clone_from(dir);
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
