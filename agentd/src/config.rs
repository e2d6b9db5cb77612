//! agentd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::queue::QueueConfig;

/// Main agentd configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM vendor endpoints and credentials
    pub providers: ProvidersConfig,

    /// Logical model id → provider
    pub models: BTreeMap<String, ProviderKind>,

    /// Work queue and worker pool
    pub queue: QueueConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Event bus and event log
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            models: default_models(),
            queue: QueueConfig::default(),
            storage: StorageConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// The model table the service ships with
pub fn default_models() -> BTreeMap<String, ProviderKind> {
    [
        ("gpt-4", ProviderKind::OpenAi),
        ("gpt-4-turbo", ProviderKind::OpenAi),
        ("gpt-3.5-turbo", ProviderKind::OpenAi),
        ("claude-3-opus", ProviderKind::Anthropic),
        ("claude-3-sonnet", ProviderKind::Anthropic),
        ("claude-3-haiku", ProviderKind::Anthropic),
        ("gemini-pro", ProviderKind::OpenRouter),
    ]
    .into_iter()
    .map(|(model, provider)| (model.to_string(), provider))
    .collect()
}

impl Config {
    /// Validate configuration before use
    ///
    /// Missing API keys are not checked here; they surface per call.
    pub fn validate(&self) -> Result<()> {
        if self.queue.workers == 0 {
            return Err(eyre::eyre!("queue.workers must be at least 1"));
        }
        if self.events.channel_capacity == 0 {
            return Err(eyre::eyre!("events.channel-capacity must be at least 1"));
        }
        if self.models.is_empty() {
            return Err(eyre::eyre!("No models configured"));
        }
        if self.queue.max_backoff_ms < self.queue.backoff_delay_ms {
            return Err(eyre::eyre!(
                "queue.max-backoff-ms ({}) is below queue.backoff-delay-ms ({})",
                self.queue.max_backoff_ms,
                self.queue.backoff_delay_ms
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .agentd.yml
        let local_config = PathBuf::from(".agentd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/agentd/agentd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentd").join("agentd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Per-vendor settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub anthropic: AnthropicConfig,
    pub openrouter: OpenRouterConfig,
}

/// Read an API key from the named environment variable, ignoring blanks
fn read_key(env: &str) -> Option<String> {
    std::env::var(env).ok().filter(|key| !key.trim().is_empty())
}

/// OpenAI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl OpenAiConfig {
    pub fn api_key(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

/// Anthropic settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Value of the `anthropic-version` header
    #[serde(rename = "anthropic-version")]
    pub anthropic_version: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            anthropic_version: "2023-06-01".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl AnthropicConfig {
    pub fn api_key(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

/// OpenRouter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// `HTTP-Referer` header; falls back to `$APP_URL`, then localhost
    pub referer: Option<String>,

    /// `X-Title` header
    pub title: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            referer: None,
            title: "agentd".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl OpenRouterConfig {
    pub fn api_key(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }

    /// Referer to send, with fallbacks applied
    pub fn resolved_referer(&self) -> String {
        self.referer
            .clone()
            .or_else(|| read_key("APP_URL"))
            .unwrap_or_else(|| "http://localhost:3000".to_string())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/agentd on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("agentd"))
            .unwrap_or_else(|| PathBuf::from(".agentd"))
            .join("agentd.db");

        Self { path }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffer size of each per-user broadcast channel
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,

    /// Directory for per-user JSONL event logs; disabled when unset
    #[serde(rename = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            log_dir: None,
        }
    }
}
