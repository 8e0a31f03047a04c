//! Configuration management for Tally.
//!
//! Handles loading configuration from TOML files and environment variables,
//! and resolving it into the explicit settings the pipeline runs with.

use crate::db::DEFAULT_QUERY_TIMEOUT_SECS;
use crate::error::{Result, TallyError};
use crate::llm::huggingface::{is_valid_token, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::llm::LlmProvider;
use crate::orchestrator::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the Hugging Face access token.
pub const ENV_TOKEN: &str = "HF_TOKEN";
/// Environment variable overriding the model identifier.
pub const ENV_MODEL: &str = "HF_MODEL";
/// Environment variable overriding the provider.
pub const ENV_PROVIDER: &str = "TALLY_LLM_PROVIDER";

/// Main configuration structure for Tally.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedded store configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "huggingface" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier sent to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Chat-completions endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on one generation request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Access token (prefer `HF_TOKEN` over storing it here).
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_provider() -> String {
    LlmProvider::HuggingFace.as_str().to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            token: None,
        }
    }
}

impl LlmConfig {
    /// Parses the configured provider name.
    pub fn provider(&self) -> Result<LlmProvider> {
        self.provider.parse().map_err(TallyError::config)
    }

    /// Returns true if the settings are enough to reach a remote model.
    ///
    /// The Hugging Face provider needs a token starting with `hf_`; anything
    /// else counts as not configured.
    pub fn is_remote_configured(&self) -> bool {
        match self.provider() {
            Ok(LlmProvider::HuggingFace) => self.token.as_deref().is_some_and(is_valid_token),
            Ok(LlmProvider::Mock) => true,
            Err(_) => false,
        }
    }
}

/// Embedded store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; defaults to the platform data directory.
    pub path: Option<PathBuf>,

    /// Upper bound on one query, in seconds. The statement is interrupted
    /// inside the engine when it runs out.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Returns the validated query timeout.
    pub fn query_timeout(&self) -> Result<Duration> {
        if self.query_timeout_secs == 0 {
            return Err(TallyError::config(
                "store.query_timeout_secs must be greater than 0",
            ));
        }
        Ok(Duration::from_secs(self.query_timeout_secs))
    }

    /// Returns the configured store path or the platform default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }

    /// Returns the default store file for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("tally.db")
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| TallyError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            TallyError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Loads the file and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `HF_TOKEN`, `HF_MODEL` and `TALLY_LLM_PROVIDER` through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_TOKEN) {
            self.llm.token = Some(token.trim().to_string());
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.llm.model = model.trim().to_string();
        }
        if let Some(provider) = non_empty(ENV_PROVIDER) {
            self.llm.provider = provider.trim().to_string();
        }
    }

    /// Resolves the settings the pipeline runs with.
    ///
    /// `templates_only` forces the template strategy even when a remote model
    /// is configured.
    pub fn pipeline_config(&self, templates_only: bool) -> Result<PipelineConfig> {
        self.llm.provider()?;

        if self.llm.timeout_secs == 0 {
            return Err(TallyError::config("llm.timeout_secs must be greater than 0"));
        }

        Ok(PipelineConfig {
            remote_capability_configured: !templates_only && self.llm.is_remote_configured(),
            remote_model_identifier: self.llm.model.clone(),
            request_timeout: Duration::from_secs(self.llm.timeout_secs),
        })
    }
}
