//! Configuration management for Parley
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, ParleyError};
use crate::providers::ProviderKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Parley
///
/// Holds provider settings, the context/summary/memory policy of the
/// engine, and where conversations are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration (OpenAI, Anthropic, Gemini, Ollama)
    pub provider: ProviderConfig,
    /// Engine behavior configuration
    #[serde(default)]
    pub engine: EngineConfig,
    /// Persistent storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Provider configuration
///
/// Specifies which AI provider to use and the settings of each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type")]
    pub provider_type: ProviderKind,

    /// OpenAI configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Anthropic configuration
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Google Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl ProviderConfig {
    /// Returns the configured model for a provider kind
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::Config;
    /// use parley::providers::ProviderKind;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.provider.model_for(ProviderKind::Ollama), "llama3.2:latest");
    /// ```
    pub fn model_for(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::OpenAi => &self.openai.model,
            ProviderKind::Anthropic => &self.anthropic.model,
            ProviderKind::Gemini => &self.gemini.model,
            ProviderKind::Ollama => &self.ollama.model,
        }
    }

    /// Returns a copy of this configuration with the model of `kind` replaced
    pub fn with_model(&self, kind: ProviderKind, model: &str) -> Self {
        let mut config = self.clone();
        match kind {
            ProviderKind::OpenAi => config.openai.model = model.to_string(),
            ProviderKind::Anthropic => config.anthropic.model = model.to_string(),
            ProviderKind::Gemini => config.gemini.model = model.to_string(),
            ProviderKind::Ollama => config.ollama.model = model.to_string(),
        }
        config
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderKind::OpenAi,
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Model to use
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Optional API base URL (useful for tests and OpenAI-compatible gateways)
    #[serde(default)]
    pub api_base: Option<String>,

    /// API key; falls back to `OPENAI_API_KEY` and the keyring when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            api_base: None,
            api_key: None,
        }
    }
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Model to use
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Optional API base URL
    #[serde(default)]
    pub api_base: Option<String>,

    /// API key; falls back to `ANTHROPIC_API_KEY` and the keyring when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            api_base: None,
            api_key: None,
        }
    }
}

/// Google Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model to use
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Optional API base URL
    #[serde(default)]
    pub api_base: Option<String>,

    /// API key; falls back to `GEMINI_API_KEY` and the keyring when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            api_base: None,
            api_key: None,
        }
    }
}

/// Ollama provider configuration
///
/// Ollama is reached through its OpenAI-compatible endpoint and needs no key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Engine behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default system instructions for new conversations
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Default sampling temperature for new conversations
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default maximum output tokens for new conversations
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Timeout for non-streaming calls and for the first byte of a stream (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Memory index settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Rolling summary settings
    #[serde(default)]
    pub summary: SummaryConfig,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_timeout() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_seconds: default_timeout(),
            context: ContextConfig::default(),
            memory: MemoryConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

/// Context assembly settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Number of most recent history messages considered per request
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Estimated token budget for the message window
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// The window is never trimmed below this many messages
    #[serde(default = "default_min_window")]
    pub min_window: usize,

    /// Number of memory entries recalled per request
    #[serde(default = "default_memory_top_k")]
    pub memory_top_k: usize,
}

fn default_history_window() -> usize {
    20
}

fn default_token_budget() -> usize {
    14_000
}

fn default_min_window() -> usize {
    2
}

fn default_memory_top_k() -> usize {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            token_budget: default_token_budget(),
            min_window: default_min_window(),
            memory_top_k: default_memory_top_k(),
        }
    }
}

/// Memory index settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum entries kept per conversation (oldest evicted first)
    #[serde(default = "default_memory_capacity")]
    pub capacity: usize,
}

fn default_memory_capacity() -> usize {
    200
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_memory_capacity(),
        }
    }
}

/// Rolling summary settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Whether the rolling summarizer runs at all
    #[serde(default = "default_summary_enabled")]
    pub enabled: bool,

    /// Number of unsummarized messages that triggers a new summary
    #[serde(default = "default_summary_threshold")]
    pub threshold: usize,

    /// Output cap for the summary request
    #[serde(default = "default_summary_max_tokens")]
    pub max_output_tokens: u32,
}

fn default_summary_enabled() -> bool {
    true
}

fn default_summary_threshold() -> usize {
    20
}

fn default_summary_max_tokens() -> u32 {
    500
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: default_summary_enabled(),
            threshold: default_summary_threshold(),
            max_output_tokens: default_summary_max_tokens(),
        }
    }
}

/// Persistent storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the sled database directory; the user data directory when unset
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            provider: ProviderConfig::default(),
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParleyError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::Config;
    /// use parley::providers::ProviderKind;
    ///
    /// let config = Config::from_yaml("provider:\n  type: anthropic\n").unwrap();
    /// assert_eq!(config.provider.provider_type, ProviderKind::Anthropic);
    /// assert_eq!(config.engine.context.token_budget, 14_000);
    /// ```
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider_type) = std::env::var("PARLEY_PROVIDER") {
            match provider_type.parse::<ProviderKind>() {
                Ok(kind) => self.provider.provider_type = kind,
                Err(_) => tracing::warn!("Invalid PARLEY_PROVIDER: {}", provider_type),
            }
        }

        if let Ok(model) = std::env::var("PARLEY_OPENAI_MODEL") {
            self.provider.openai.model = model;
        }
        if let Ok(model) = std::env::var("PARLEY_ANTHROPIC_MODEL") {
            self.provider.anthropic.model = model;
        }
        if let Ok(model) = std::env::var("PARLEY_GEMINI_MODEL") {
            self.provider.gemini.model = model;
        }
        if let Ok(host) = std::env::var("PARLEY_OLLAMA_HOST") {
            self.provider.ollama.host = host;
        }
        if let Ok(model) = std::env::var("PARLEY_OLLAMA_MODEL") {
            self.provider.ollama.model = model;
        }

        if let Ok(timeout) = std::env::var("PARLEY_TIMEOUT_SECONDS") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.engine.timeout_seconds = v;
                    tracing::debug!(timeout_seconds = v, "Env override: PARLEY_TIMEOUT_SECONDS");
                }
                Err(_) => tracing::warn!("Invalid PARLEY_TIMEOUT_SECONDS: {}", timeout),
            }
        }

        if let Ok(budget) = std::env::var("PARLEY_TOKEN_BUDGET") {
            match budget.parse::<usize>() {
                Ok(v) => {
                    self.engine.context.token_budget = v;
                    tracing::debug!(token_budget = v, "Env override: PARLEY_TOKEN_BUDGET");
                }
                Err(_) => tracing::warn!("Invalid PARLEY_TOKEN_BUDGET: {}", budget),
            }
        }

        if let Ok(path) = std::env::var("PARLEY_STORAGE_PATH") {
            tracing::debug!(path = %path, "Env override: PARLEY_STORAGE_PATH");
            self.storage.path = Some(path);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.engine.timeout_seconds == 0 {
            return Err(ParleyError::Config(
                "engine.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.engine.temperature) {
            return Err(ParleyError::Config(
                "engine.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.engine.max_output_tokens == 0 {
            return Err(ParleyError::Config(
                "engine.max_output_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        let context = &self.engine.context;
        if context.history_window == 0 {
            return Err(ParleyError::Config(
                "engine.context.history_window must be greater than 0".to_string(),
            )
            .into());
        }

        if context.token_budget == 0 {
            return Err(ParleyError::Config(
                "engine.context.token_budget must be greater than 0".to_string(),
            )
            .into());
        }

        if context.min_window < 2 {
            return Err(ParleyError::Config(
                "engine.context.min_window must be at least 2".to_string(),
            )
            .into());
        }

        if self.engine.memory.capacity == 0 {
            return Err(ParleyError::Config(
                "engine.memory.capacity must be greater than 0".to_string(),
            )
            .into());
        }

        if self.engine.summary.threshold == 0 {
            return Err(ParleyError::Config(
                "engine.summary.threshold must be greater than 0".to_string(),
            )
            .into());
        }

        if self.provider.ollama.host.is_empty() {
            return Err(
                ParleyError::Config("provider.ollama.host cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
