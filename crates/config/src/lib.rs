//! Configuration loading, validation, and management for Stride.
//!
//! Loads configuration from `~/.stride/config.toml` with environment
//! variable overrides. Validates all settings at startup; an invalid
//! configuration never reaches the turn loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stride/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key for backends that don't set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Backend used when aggregation is off
    #[serde(default = "default_backend")]
    pub default_backend: String,

    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Retry policy shared by every backend
    #[serde(default)]
    pub retry: RetryConfig,

    /// Mixture-of-agents aggregation
    #[serde(default)]
    pub moa: MoaConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Named generation backends
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,
}

fn default_backend() -> String {
    "openai".into()
}

fn default_backends() -> BTreeMap<String, BackendConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(default_backend(), BackendConfig::default());
    backends
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_backend", &self.default_backend)
            .field("agent", &self.agent)
            .field("retry", &self.retry)
            .field("moa", &self.moa)
            .field("workspace", &self.workspace)
            .field("logging", &self.logging)
            .field("persistence", &self.persistence)
            .field("backends", &self.backends)
            .finish()
    }
}

// --- Agent ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per generation call
    #[serde(default = "default_max_tokens_per_turn")]
    pub max_tokens_per_turn: u32,

    /// Turns allowed per run
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Output-token budget per run (unlimited when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    /// Read-only tool calls that may run at once
    #[serde(default = "default_tool_concurrency")]
    pub tool_concurrency: usize,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Tools that end the run once executed
    #[serde(default = "default_terminal_tools")]
    pub terminal_tools: Vec<String>,

    /// Skip the confirmation prompt for gated tools
    #[serde(default)]
    pub auto_approve: bool,
}

fn default_system_prompt() -> String {
    "You are a capable software agent working inside a sandboxed workspace. \
     Use the available tools to inspect and change files. When the task is \
     done, call the `complete` tool with your final answer."
        .into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens_per_turn() -> u32 {
    4096
}
fn default_max_turns() -> u32 {
    200
}
fn default_tool_concurrency() -> usize {
    10
}
fn default_tool_timeout_secs() -> u64 {
    300
}
fn default_terminal_tools() -> Vec<String> {
    vec!["complete".into()]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens_per_turn: default_max_tokens_per_turn(),
            max_turns: default_max_turns(),
            max_output_tokens: None,
            tool_concurrency: default_tool_concurrency(),
            tool_timeout_secs: default_tool_timeout_secs(),
            terminal_tools: default_terminal_tools(),
            auto_approve: false,
        }
    }
}

// --- Backends ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any `/chat/completions` endpoint (OpenAI, OpenRouter, Ollama, vLLM, ...)
    OpenaiCompat,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-attempt wall-clock limit
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides `retry.max_retries` for this backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::OpenaiCompat
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_backend_timeout_secs() -> u64 {
    120
}

impl BackendConfig {
    /// The backend's own key, falling back to the global one.
    pub fn resolved_api_key<'a>(&'a self, global: &'a Option<String>) -> Option<&'a str> {
        self.api_key.as_deref().or(global.as_deref())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            model: default_model(),
            api_url: None,
            api_key: None,
            enabled: true,
            timeout_secs: default_backend_timeout_secs(),
            max_retries: None,
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("enabled", &self.enabled)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

// --- Retry ---

/// Exponential backoff: `min(max_delay, base_delay * 2^attempt)`, scaled by
/// a random factor in `1 ± jitter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of the delay to randomize, 0.0..=1.0
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

// --- Mixture of agents ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoaConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Reference backends, in the order their answers are presented
    #[serde(default)]
    pub references: Vec<String>,

    /// Synthesizing backend (defaults to the first reference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,

    /// Fan-out/aggregate rounds, 1..=5
    #[serde(default = "default_num_layers")]
    pub num_layers: u32,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Ask the aggregator directly when aggregation can't produce an answer
    #[serde(default = "default_true")]
    pub fallback_to_single_model: bool,

    /// Must contain `{query}` and `{responses}`
    #[serde(default = "default_aggregation_prompt_template")]
    pub aggregation_prompt_template: String,

    #[serde(default = "default_aggregator_system_prompt")]
    pub aggregator_system_prompt: String,
}

pub const MAX_MOA_LAYERS: u32 = 5;

fn default_num_layers() -> u32 {
    1
}
fn default_max_concurrent_requests() -> usize {
    3
}
fn default_aggregation_prompt_template() -> String {
    "Several models answered the query below. Their answers follow, each \
     labelled with the model that produced it.\n\n\
     Query:\n{query}\n\n\
     Answers:\n{responses}\n\n\
     Write one answer that keeps what is correct and well supported, \
     resolves disagreements, and drops anything wrong. Do not mention the \
     individual models."
        .into()
}
fn default_aggregator_system_prompt() -> String {
    "You synthesize several candidate answers into a single accurate, \
     complete and well-structured response."
        .into()
}

impl MoaConfig {
    /// The aggregator key, falling back to the first reference.
    pub fn aggregator_key(&self) -> Option<&str> {
        self.aggregator
            .as_deref()
            .or_else(|| self.references.first().map(String::as_str))
    }
}

impl Default for MoaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            references: Vec::new(),
            aggregator: None,
            num_layers: default_num_layers(),
            max_concurrent_requests: default_max_concurrent_requests(),
            fallback_to_single_model: true,
            aggregation_prompt_template: default_aggregation_prompt_template(),
            aggregator_system_prompt: default_aggregator_system_prompt(),
        }
    }
}

// --- Workspace, logging, persistence ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory the tools operate in (defaults to `~/.stride/workspace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Append every event to this JSONL file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.stride/config.toml).
    ///
    /// Environment overrides:
    /// - `STRIDE_API_KEY`, then `OPENAI_API_KEY`, when no key is configured
    /// - `STRIDE_BACKEND` replaces `default_backend`
    /// - `STRIDE_MODEL` replaces the default backend's model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("STRIDE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(backend) = std::env::var("STRIDE_BACKEND") {
            config.default_backend = backend;
        }

        if let Ok(model) = std::env::var("STRIDE_MODEL") {
            if let Some(backend) = config.backends.get_mut(&config.default_backend) {
                backend.model = model;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stride")
    }

    /// The directory tools operate in.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return invalid("agent.temperature must be between 0.0 and 2.0".into());
        }
        if self.agent.max_turns == 0 {
            return invalid("agent.max_turns must be at least 1".into());
        }
        if self.agent.tool_concurrency == 0 {
            return invalid("agent.tool_concurrency must be at least 1".into());
        }
        if self.agent.tool_timeout_secs == 0 {
            return invalid("agent.tool_timeout_secs must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return invalid("retry.jitter must be between 0.0 and 1.0".into());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms".into());
        }
        for (key, backend) in &self.backends {
            if backend.timeout_secs == 0 {
                return invalid(format!("backends.{key}.timeout_secs must be at least 1"));
            }
        }

        if self.moa.enabled {
            self.validate_moa()?;
        } else {
            self.enabled_backend(&self.default_backend, "default_backend")?;
        }

        Ok(())
    }

    fn validate_moa(&self) -> Result<(), ConfigError> {
        let moa = &self.moa;
        if moa.references.is_empty() {
            return Err(ConfigError::ValidationError(
                "moa is enabled but moa.references is empty".into(),
            ));
        }
        for reference in &moa.references {
            self.enabled_backend(reference, "moa.references")?;
        }
        match moa.aggregator_key() {
            Some(aggregator) => {
                self.enabled_backend(aggregator, "moa.aggregator")?;
            }
            None => {
                return Err(ConfigError::ValidationError("moa.aggregator is not set".into()));
            }
        }
        if !(1..=MAX_MOA_LAYERS).contains(&moa.num_layers) {
            return Err(ConfigError::ValidationError(format!(
                "moa.num_layers must be between 1 and {MAX_MOA_LAYERS}"
            )));
        }
        if moa.max_concurrent_requests == 0 {
            return Err(ConfigError::ValidationError(
                "moa.max_concurrent_requests must be at least 1".into(),
            ));
        }
        for placeholder in ["{query}", "{responses}"] {
            if !moa.aggregation_prompt_template.contains(placeholder) {
                return Err(ConfigError::ValidationError(format!(
                    "moa.aggregation_prompt_template must contain {placeholder}"
                )));
            }
        }
        Ok(())
    }

    fn enabled_backend(&self, key: &str, field: &str) -> Result<&BackendConfig, ConfigError> {
        match self.backends.get(key) {
            Some(backend) if backend.enabled => Ok(backend),
            Some(_) => Err(ConfigError::ValidationError(format!(
                "{field} names disabled backend '{key}'"
            ))),
            None => Err(ConfigError::ValidationError(format!(
                "{field} names unknown backend '{key}'"
            ))),
        }
    }

    /// Check if an API key is available for the default backend.
    pub fn has_api_key(&self) -> bool {
        self.backends
            .get(&self.default_backend)
            .and_then(|b| b.resolved_api_key(&self.api_key))
            .is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_backend: default_backend(),
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            moa: MoaConfig::default(),
            workspace: WorkspaceConfig::default(),
            logging: LoggingConfig::default(),
            persistence: PersistenceConfig::default(),
            backends: default_backends(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
