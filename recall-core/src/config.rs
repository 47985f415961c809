//! Configuration for the recall memory system.
//!
//! Maps directly to `recall.toml`. Every section is optional; missing keys
//! fall back to the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Database location and connection options.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pruning policy.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Retrieval defaults.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Filters applied when turning chat messages into memories.
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// AI provider settings (consumed by `recall-llm`).
    #[serde(default)]
    pub ai: AiConfig,
}

impl RecallConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `StoreError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Render the configuration back to TOML.
    ///
    /// # Errors
    /// Returns `StoreError::Config` if serialisation fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Override fields from `RECALL_*` environment variables (and
    /// `OPENAI_API_KEY`).
    ///
    /// # Errors
    /// Returns `StoreError::Config` if a numeric variable does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// arbitrary lookup, so tests don't have to mutate the process env.
    ///
    /// # Errors
    /// Returns `StoreError::Config` if a numeric value does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RECALL_DB_PATH") {
            self.storage.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RECALL_LOG_LEVEL") {
            self.general.log_level = v.to_lowercase();
        }
        if let Some(v) = lookup("RECALL_RETENTION_DAYS") {
            self.retention.retention_days = parse_env("RECALL_RETENTION_DAYS", &v)?;
        }
        if let Some(v) = lookup("RECALL_AI_PROVIDER") {
            self.ai.provider = v.to_lowercase();
        }
        if let Some(v) = lookup("RECALL_AI_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = lookup("RECALL_AI_BASE_URL") {
            self.ai.base_url = v;
        }
        if let Some(v) = lookup("RECALL_AI_TEMPERATURE") {
            self.ai.temperature = parse_env("RECALL_AI_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.ai.api_key = Some(v);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| StoreError::Config(format!("{key}: cannot parse '{value}'")))
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// SQLite storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Use WAL mode so readers don't block the writer.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// How long a statement waits on a locked database before failing.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// Age/importance pruning policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Memories older than this many days are eligible for pruning.
    #[serde(default = "default_365")]
    pub retention_days: u32,
    /// Only memories with importance strictly below this are pruned.
    #[serde(default = "default_0_3")]
    pub importance_threshold: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: 365,
            importance_threshold: 0.3,
        }
    }
}

/// Retrieval defaults used when a [`RetrievalQuery`](crate::retrieval::RetrievalQuery) leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories returned per query.
    #[serde(default = "default_5_usize")]
    pub default_limit: usize,
    /// Importance floor for retrieval.
    #[serde(default)]
    pub min_importance: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            min_importance: 0.0,
        }
    }
}

/// Thresholds for [`TextProcessor`](crate::processing::TextProcessor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Fewest words a sentence needs to become a memory.
    #[serde(default = "default_3_usize")]
    pub min_words: usize,
    /// Most words a memory may have.
    #[serde(default = "default_30_usize")]
    pub max_words: usize,
    /// Reject sentences whose share of stop-words exceeds this.
    #[serde(default = "default_0_7_f64")]
    pub max_stop_word_ratio: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            min_words: 3,
            max_words: 30,
            max_stop_word_ratio: 0.7,
        }
    }
}

/// AI provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider: "openai" (any OpenAI-compatible endpoint) or "none".
    #[serde(default = "default_openai")]
    pub provider: String,
    /// Base URL of the API.
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// API key. Usually supplied through `OPENAI_API_KEY`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Chat model.
    #[serde(default = "default_model")]
    pub model: String,
    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Sampling temperature.
    #[serde(default = "default_0_7")]
    pub temperature: f32,
    /// Maximum tokens per response.
    #[serde(default = "default_1000")]
    pub max_tokens: u32,
    /// Hard timeout for any API call in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// System prompt sent ahead of every conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            base_url: default_openai_url(),
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout_ms: 30_000,
            max_retries: 2,
            system_prompt: default_system_prompt(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_db_path() -> PathBuf { PathBuf::from("data/memories.db") }
fn default_openai() -> String { "openai".to_string() }
fn default_openai_url() -> String { "https://api.openai.com".to_string() }
fn default_model() -> String { "gpt-4o".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_system_prompt() -> String {
    "You are an assistant with long-term memory. Use what you remember about the \
     user when it is relevant, and stop referring to anything the user asks you to forget."
        .to_string()
}
fn default_0_3() -> f64 { 0.3 }
fn default_0_7() -> f32 { 0.7 }
fn default_0_7_f64() -> f64 { 0.7 }
fn default_2() -> u32 { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_30_usize() -> usize { 30 }
fn default_365() -> u32 { 365 }
fn default_1000() -> u32 { 1000 }
fn default_5000() -> u64 { 5000 }
fn default_30000() -> u64 { 30_000 }
