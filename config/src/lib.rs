//! Load the Quill configuration from a single YAML file, substitute `${ENV_VAR}`
//! references, and validate everything at startup (fail-fast: a bad config never
//! reaches the orchestrator).
//!
//! Secrets are never written into the YAML file directly; they are referenced as
//! `${OUTLINE_API_KEY}` and resolved from the process environment at load time.

mod subst;

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub use subst::substitute_env;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read config file: {0}")]
    Read(std::io::Error),
    #[error("parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("environment variable not set: {0}")]
    MissingEnv(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration. Every section has serde defaults so a minimal file
/// only needs the required fields (`outline.api_key`, `ai.api_key`,
/// `persistence.database_path`).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub outline: OutlineConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub qna: QnaConfig,
    #[serde(default)]
    pub enhancement: EnhancementConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Worker pool size; must be >= 1.
    #[serde(default = "default_workers")]
    pub max_concurrent_workers: usize,
    /// Port for /health, /ready, /metrics (separate from the webhook port).
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhooksConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    #[serde(default = "default_webhook_path")]
    pub path: String,
    /// Event kinds acted on; everything else is acknowledged and ignored.
    #[serde(default = "default_events")]
    pub events: Vec<String>,
    #[serde(default = "default_true")]
    pub signature_validation: bool,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default)]
    pub fallback_polling: FallbackPollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackPollingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_polling_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutlineConfig {
    #[serde(default)]
    pub api_endpoint: String,
    /// Required. Reference as `${OUTLINE_API_KEY}` in the YAML.
    #[serde(default)]
    pub api_key: String,
    /// Required when webhooks + signature validation are enabled.
    #[serde(default)]
    pub webhook_secret: String,
    /// Previous secret kept valid during rotation (24h grace window).
    #[serde(default)]
    pub previous_webhook_secret: Option<String>,
    #[serde(default = "default_outline_rpm")]
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f64,
    #[serde(default = "default_ai_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_ai_rpm")]
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub retry_backoff_base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub retry_backoff_max_secs: u64,
    /// Per-task deadline for worker-pool tasks.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxonomyConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub include_sample_documents: bool,
    #[serde(default = "default_max_samples")]
    pub max_samples_per_collection: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMethod {
    #[default]
    Comment,
    Inline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QnaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_context_docs")]
    pub max_context_documents: usize,
    #[serde(default)]
    pub answer_method: AnswerMethod,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnhancementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub enhance_titles: bool,
    #[serde(default = "default_true")]
    pub add_summaries: bool,
    #[serde(default = "default_true")]
    pub idempotent_updates: bool,
    /// When true, a section whose markers the user removed is never rewritten.
    #[serde(default = "default_true")]
    pub respect_user_ownership: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandsConfig {
    #[serde(default = "default_commands")]
    pub available: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Required. Path of the embedded SQLite database file.
    #[serde(default)]
    pub database_path: String,
    #[serde(default)]
    pub backup_enabled: bool,
    #[serde(default = "default_backup_interval")]
    pub backup_interval_secs: u64,
    /// question_state rows older than this are swept hourly.
    #[serde(default = "default_retention_days")]
    pub question_retention_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
    /// File path for log output; stdout when unset.
    #[serde(default)]
    pub output: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_workers() -> usize {
    3
}
fn default_health_port() -> u16 {
    8080
}
fn default_webhook_port() -> u16 {
    8081
}
fn default_webhook_path() -> String {
    "/webhooks".to_string()
}
fn default_events() -> Vec<String> {
    vec!["documents.update".to_string(), "documents.create".to_string()]
}
fn default_queue_size() -> usize {
    1000
}
fn default_polling_interval() -> u64 {
    60
}
fn default_outline_rpm() -> u32 {
    60
}
fn default_confidence() -> f64 {
    0.7
}
fn default_ai_timeout() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_ai_rpm() -> u32 {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    30
}
fn default_backoff_max() -> u64 {
    300
}
fn default_task_timeout() -> u64 {
    300
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_max_samples() -> usize {
    5
}
fn default_max_context_docs() -> usize {
    5
}
fn default_commands() -> Vec<String> {
    ["/ai", "/ai-file", "/summarize", "/enhance-title", "/related"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_backup_interval() -> u64 {
    86400
}
fn default_retention_days() -> u32 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_workers(),
            health_port: default_health_port(),
        }
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_webhook_port(),
            path: default_webhook_path(),
            events: default_events(),
            signature_validation: true,
            queue_size: default_queue_size(),
            fallback_polling: FallbackPollingConfig::default(),
        }
    }
}

impl Default for FallbackPollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_polling_interval(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_base_secs: default_backoff_base(),
            retry_backoff_max_secs: default_backoff_max(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            include_sample_documents: true,
            max_samples_per_collection: default_max_samples(),
        }
    }
}

impl Default for QnaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_documents: default_max_context_docs(),
            answer_method: AnswerMethod::Comment,
        }
    }
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enhance_titles: true,
            add_summaries: true,
            idempotent_updates: true,
            respect_user_ownership: true,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            available: default_commands(),
        }
    }
}

impl Config {
    /// Reads the YAML file at `path`, substitutes `${ENV_VAR}` references, parses,
    /// and validates. Any failure aborts startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(LoadError::Read)?;
        Self::from_yaml(&raw)
    }

    /// Parses config from a YAML string (after env substitution). Used by `load`
    /// and directly by tests.
    pub fn from_yaml(raw: &str) -> Result<Self, LoadError> {
        let substituted = substitute_env(raw)?;
        let config: Config = serde_yaml::from_str(&substituted)?;
        config.validate()?;
        Ok(config)
    }

    /// Range and requirement checks per the recognized option set. Returns the
    /// first violation; the caller prints it and exits non-zero.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.service.max_concurrent_workers < 1 {
            return Err(LoadError::Invalid(
                "service.max_concurrent_workers must be >= 1".into(),
            ));
        }
        if self.webhooks.port < 1024 {
            return Err(LoadError::Invalid(
                "webhooks.port must be in 1024..=65535".into(),
            ));
        }
        if self.webhooks.queue_size == 0 {
            return Err(LoadError::Invalid("webhooks.queue_size must be > 0".into()));
        }
        if self.outline.api_key.is_empty() {
            return Err(LoadError::Invalid("outline.api_key is required".into()));
        }
        if self.webhooks.enabled
            && self.webhooks.signature_validation
            && self.outline.webhook_secret.is_empty()
        {
            return Err(LoadError::Invalid(
                "outline.webhook_secret is required when webhook signature validation is on"
                    .into(),
            ));
        }
        if self.ai.api_key.is_empty() {
            return Err(LoadError::Invalid("ai.api_key is required".into()));
        }
        if !(0.0..=1.0).contains(&self.ai.confidence_threshold) {
            return Err(LoadError::Invalid(
                "ai.confidence_threshold must be within [0, 1]".into(),
            ));
        }
        if self.ai.max_tokens < 100 {
            return Err(LoadError::Invalid("ai.max_tokens must be >= 100".into()));
        }
        if self.processing.retry_backoff_max_secs < self.processing.retry_backoff_base_secs {
            return Err(LoadError::Invalid(
                "processing.retry_backoff_max_secs must be >= retry_backoff_base_secs".into(),
            ));
        }
        if self.qna.max_context_documents < 1 {
            return Err(LoadError::Invalid(
                "qna.max_context_documents must be >= 1".into(),
            ));
        }
        if self.persistence.database_path.is_empty() {
            return Err(LoadError::Invalid(
                "persistence.database_path is required".into(),
            ));
        }
        Ok(())
    }
}
