//! TOML Configuration File Support
//!
//! Centralized configuration loading for the advisor daemon and CLI, with a
//! TOML file at `~/.config/finance-advisor/advisor.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [provider]
//! kind = "openai"                      # "ollama" | "openai" | "chat"
//! model = "gpt-4o-mini"
//! base_url = "https://api.openai.com/v1"
//! temperature = 0.3
//! max_tokens = 1024
//! connect_timeout_ms = 10000
//! read_timeout_ms = 60000
//!
//! [server]
//! listen = "127.0.0.1:8787"
//! max_prompt_length = 4000
//!
//! [streaming]
//! max_concurrent_streams = 16
//! ```
//!
//! The API key is read from `OPENAI_API_KEY` (or `api_key` in the file).
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |---|---|
//! | `ADVISOR_PROVIDER` | provider kind |
//! | `ADVISOR_MODEL` | model name |
//! | `ADVISOR_BASE_URL` | OpenAI-compatible base URL |
//! | `ADVISOR_CHAT_URL` | daemon URL for the `chat` provider |
//! | `ADVISOR_LISTEN` | daemon listen address |
//! | `ADVISOR_MAX_PROMPT_LENGTH` | prompt limit in characters |
//! | `ADVISOR_MAX_STREAMS` | concurrent stream limit |
//! | `OPENAI_API_KEY` | API key |
//! | `OLLAMA_HOST`, `OLLAMA_PORT` | Ollama server |

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advisor::AdvisorConfig;
use crate::backend::{BackendConfig, OPENAI_BASE_URL};
use crate::streaming::StreamManagerConfig;

/// Default system prompt sent with every request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful personal-finance assistant. \
Answer with a short title, an optional description, concrete strategies and numbered steps \
where useful, and a few practical tips. Do not give individualized investment, tax or legal advice.";

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

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Which completion provider to stream from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI-compatible API
    OpenAi,
    /// Another advisor daemon
    Chat,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "chat" | "daemon" => Ok(Self::Chat),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected ollama, openai or chat)"
            ))),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Provider kind
    pub kind: Option<ProviderKind>,
    /// Model name
    pub model: Option<String>,
    /// Ollama host
    pub host: Option<String>,
    /// Ollama port
    pub port: Option<u16>,
    /// OpenAI-compatible base URL
    pub base_url: Option<String>,
    /// API key (prefer `OPENAI_API_KEY`)
    pub api_key: Option<String>,
    /// Daemon URL for the chat provider
    pub url: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Response token limit
    pub max_tokens: Option<u32>,
    /// System prompt
    pub system_prompt: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Maximum gap between body chunks in milliseconds
    pub read_timeout_ms: Option<u64>,
}

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address
    pub listen: Option<String>,
    /// Maximum prompt length in characters
    pub max_prompt_length: Option<usize>,
}

/// Streaming section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingToml {
    /// Maximum concurrent streams
    pub max_concurrent_streams: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorToml {
    /// Provider configuration section
    pub provider: ProviderToml,
    /// Server configuration section
    pub server: ServerToml,
    /// Streaming configuration section
    pub streaming: StreamingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone)]
pub struct AdvisorConfigFile {
    /// Provider kind
    pub provider: ProviderKind,
    /// Model name
    pub model: String,
    /// Ollama host
    pub ollama_host: String,
    /// Ollama port
    pub ollama_port: u16,
    /// OpenAI-compatible base URL
    pub openai_base_url: String,
    /// OpenAI API key
    pub openai_api_key: String,
    /// Daemon URL for the chat provider
    pub chat_url: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token limit (0 = provider default)
    pub max_tokens: u32,
    /// System prompt
    pub system_prompt: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum gap between body chunks
    pub read_timeout: Duration,
    /// Daemon listen address
    pub listen: SocketAddr,
    /// Maximum prompt length in characters
    pub max_prompt_length: usize,
    /// Maximum concurrent streams
    pub max_concurrent_streams: usize,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl fmt::Debug for AdvisorConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorConfigFile")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("ollama_host", &self.ollama_host)
            .field("ollama_port", &self.ollama_port)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &if self.openai_api_key.is_empty() { "" } else { "<redacted>" })
            .field("chat_url", &self.chat_url)
            .field("listen", &self.listen)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Default for AdvisorConfigFile {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "llama3.2".to_string(),
            ollama_host: "localhost".to_string(),
            ollama_port: 11434,
            openai_base_url: OPENAI_BASE_URL.to_string(),
            openai_api_key: String::new(),
            chat_url: "http://127.0.0.1:8787".to_string(),
            temperature: 0.3,
            max_tokens: 0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            max_prompt_length: 4000,
            max_concurrent_streams: 16,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl AdvisorConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Backend selected by this configuration
    #[must_use]
    pub fn backend_config(&self) -> BackendConfig {
        match self.provider {
            ProviderKind::Ollama => BackendConfig::ollama(self.ollama_host.clone(), self.ollama_port),
            ProviderKind::OpenAi => BackendConfig::OpenAi {
                api_key: self.openai_api_key.clone(),
                base_url: self.openai_base_url.clone(),
            },
            ProviderKind::Chat => BackendConfig::ChatEndpoint {
                url: self.chat_url.clone(),
            },
        }
    }

    /// Request settings for the orchestrator
    #[must_use]
    pub fn advisor_config(&self) -> AdvisorConfig {
        AdvisorConfig {
            model: self.model.clone(),
            system_prompt: Some(self.system_prompt.clone()).filter(|s| !s.trim().is_empty()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_prompt_length: self.max_prompt_length,
        }
    }

    /// Stream manager settings
    #[must_use]
    pub fn stream_config(&self) -> StreamManagerConfig {
        StreamManagerConfig {
            max_concurrent_streams: self.max_concurrent_streams,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".to_string()));
        }
        if self.max_prompt_length == 0 {
            return Err(ConfigError::ValidationError(
                "max_prompt_length must be positive".to_string(),
            ));
        }
        if self.max_concurrent_streams == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_streams must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/finance-advisor/advisor.toml` or
/// `~/.config/finance-advisor/advisor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("finance-advisor").join("advisor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting configuration is invalid. A missing config file is not an error.
pub fn load_config() -> Result<AdvisorConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<AdvisorConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<E>(
    path: Option<PathBuf>,
    env: E,
) -> Result<AdvisorConfigFile, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = AdvisorConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: AdvisorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn parse_listen(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("invalid listen address '{value}'")))
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AdvisorConfigFile, toml: &AdvisorToml) -> Result<(), ConfigError> {
    let provider = &toml.provider;
    if let Some(kind) = provider.kind {
        config.provider = kind;
    }
    if let Some(ref model) = provider.model {
        config.model = model.clone();
    }
    if let Some(ref host) = provider.host {
        config.ollama_host = host.clone();
    }
    if let Some(port) = provider.port {
        config.ollama_port = port;
    }
    if let Some(ref base_url) = provider.base_url {
        config.openai_base_url = base_url.clone();
    }
    if let Some(ref api_key) = provider.api_key {
        config.openai_api_key = api_key.clone();
    }
    if let Some(ref url) = provider.url {
        config.chat_url = url.clone();
    }
    if let Some(temperature) = provider.temperature {
        config.temperature = temperature;
    }
    if let Some(max_tokens) = provider.max_tokens {
        config.max_tokens = max_tokens;
    }
    if let Some(ref prompt) = provider.system_prompt {
        config.system_prompt = prompt.clone();
    }
    if let Some(ms) = provider.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = provider.read_timeout_ms {
        config.read_timeout = Duration::from_millis(ms);
    }

    if let Some(ref listen) = toml.server.listen {
        config.listen = parse_listen(listen)?;
    }
    if let Some(length) = toml.server.max_prompt_length {
        config.max_prompt_length = length;
    }

    if let Some(max) = toml.streaming.max_concurrent_streams {
        config.max_concurrent_streams = max;
    }

    Ok(())
}

/// Apply environment variable overrides to the config
///
/// Unparsable numeric values are ignored with a warning; an unknown provider
/// or listen address is an error.
fn apply_env_config<E>(config: &mut AdvisorConfigFile, env: E) -> Result<(), ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    if let Some(kind) = env("ADVISOR_PROVIDER") {
        config.provider = kind.parse()?;
        touched = true;
    }
    if let Some(model) = env("ADVISOR_MODEL") {
        config.model = model;
        touched = true;
    }
    if let Some(base_url) = env("ADVISOR_BASE_URL") {
        config.openai_base_url = base_url;
        touched = true;
    }
    if let Some(url) = env("ADVISOR_CHAT_URL") {
        config.chat_url = url;
        touched = true;
    }
    if let Some(listen) = env("ADVISOR_LISTEN") {
        config.listen = parse_listen(&listen)?;
        touched = true;
    }
    if let Some(api_key) = env("OPENAI_API_KEY") {
        config.openai_api_key = api_key;
        touched = true;
    }
    if let Some(host) = env("OLLAMA_HOST") {
        config.ollama_host = host;
        touched = true;
    }

    if let Some(port) = env("OLLAMA_PORT") {
        match port.parse::<u16>() {
            Ok(port) => {
                config.ollama_port = port;
                touched = true;
            }
            Err(_) => tracing::warn!(value = %port, "Ignoring invalid OLLAMA_PORT"),
        }
    }
    if let Some(length) = env("ADVISOR_MAX_PROMPT_LENGTH") {
        match length.parse::<usize>() {
            Ok(length) => {
                config.max_prompt_length = length;
                touched = true;
            }
            Err(_) => tracing::warn!(value = %length, "Ignoring invalid ADVISOR_MAX_PROMPT_LENGTH"),
        }
    }
    if let Some(max) = env("ADVISOR_MAX_STREAMS") {
        match max.parse::<usize>() {
            Ok(max) => {
                config.max_concurrent_streams = max;
                touched = true;
            }
            Err(_) => tracing::warn!(value = %max, "Ignoring invalid ADVISOR_MAX_STREAMS"),
        }
    }

    if touched {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Provider override
    pub provider: Option<ProviderKind>,
    /// Model override
    pub model: Option<String>,
    /// Listen address override
    pub listen: Option<SocketAddr>,
    /// Daemon URL override
    pub chat_url: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set provider override
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set listen address override
    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = Some(listen);
        self
    }

    /// Point the chat provider at a daemon
    #[must_use]
    pub fn with_chat_url(mut self, url: impl Into<String>) -> Self {
        self.chat_url = Some(url.into());
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut AdvisorConfigFile) {
        if self.provider.is_some()
            || self.model.is_some()
            || self.listen.is_some()
            || self.chat_url.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(ref url) = self.chat_url {
            config.chat_url = url.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
