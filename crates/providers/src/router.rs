//! Backend router: builds the configured backends and picks the
//! generation strategy the turn loop will use.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stride_config::{AppConfig, BackendConfig, BackendKind};
use stride_core::error::ProviderError;
use stride_core::provider::Provider;
use tracing::info;

use crate::moa::{MixtureOfAgents, MoaSettings};
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{BackendHealth, ModelBackend, RetryPolicy};

/// Every enabled backend, wrapped with retry and health tracking.
pub struct BackendRouter {
    backends: BTreeMap<String, Arc<ModelBackend>>,
    default_backend: String,
}

impl BackendRouter {
    pub fn new(default_backend: impl Into<String>) -> Self {
        Self {
            backends: BTreeMap::new(),
            default_backend: default_backend.into(),
        }
    }

    pub fn register(&mut self, backend: Arc<ModelBackend>) {
        self.backends.insert(backend.key().to_string(), backend);
    }

    pub fn get(&self, key: &str) -> Option<Arc<ModelBackend>> {
        self.backends.get(key).cloned()
    }

    pub fn default_backend(&self) -> Option<Arc<ModelBackend>> {
        self.get(&self.default_backend)
    }

    /// List all registered backend keys.
    pub fn list(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }

    fn require(&self, key: &str) -> Result<Arc<ModelBackend>, ProviderError> {
        self.get(key)
            .ok_or_else(|| ProviderError::NotConfigured(format!("backend '{key}' is not configured")))
    }
}

/// How the turn loop gets its responses.
#[derive(Clone)]
pub enum GenerationStrategy {
    Single(Arc<ModelBackend>),
    Aggregated(Arc<MixtureOfAgents>),
}

impl GenerationStrategy {
    pub fn provider(&self) -> Arc<dyn Provider> {
        match self {
            Self::Single(backend) => backend.clone(),
            Self::Aggregated(moa) => moa.clone(),
        }
    }

    pub fn health_report(&self) -> Vec<BackendHealth> {
        match self {
            Self::Single(backend) => vec![backend.health()],
            Self::Aggregated(moa) => moa.health_report(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Single(backend) => format!("single backend '{}'", backend.key()),
            Self::Aggregated(moa) => format!(
                "mixture of agents [{}] aggregated by '{}'",
                moa.reference_keys().join(", "),
                moa.aggregator_key()
            ),
        }
    }
}

/// Build every enabled backend from configuration.
pub fn build_from_config(config: &AppConfig) -> Result<BackendRouter, ProviderError> {
    let mut router = BackendRouter::new(&config.default_backend);
    let base_policy = RetryPolicy::from_config(&config.retry);

    for (key, backend_config) in config.backends.iter().filter(|(_, b)| b.enabled) {
        let inner = build_backend(key, backend_config, &config.api_key)?;
        let policy = RetryPolicy {
            max_retries: backend_config.max_retries.unwrap_or(base_policy.max_retries),
            ..base_policy.clone()
        };
        router.register(Arc::new(
            ModelBackend::new(key.clone(), inner)
                .with_retry_policy(policy)
                .with_timeout(Duration::from_secs(backend_config.timeout_secs)),
        ));
    }

    Ok(router)
}

fn build_backend(
    key: &str,
    config: &BackendConfig,
    global_api_key: &Option<String>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    match config.kind {
        BackendKind::OpenaiCompat => {
            let base_url = config.api_url.clone().unwrap_or_else(|| default_base_url(key));
            let api_key = config.resolved_api_key(global_api_key).unwrap_or_default();
            Ok(Arc::new(OpenAiCompatProvider::new(key, base_url, api_key, &config.model)?))
        }
    }
}

/// Single backend, or the aggregation layer when `moa.enabled` is set.
pub fn build_strategy(config: &AppConfig, router: &BackendRouter) -> Result<GenerationStrategy, ProviderError> {
    if !config.moa.enabled {
        let backend = router.require(&config.default_backend)?;
        info!(backend = %backend.key(), "Using single backend");
        return Ok(GenerationStrategy::Single(backend));
    }

    let references = config
        .moa
        .references
        .iter()
        .map(|key| router.require(key))
        .collect::<Result<Vec<_>, _>>()?;
    let aggregator_key = config
        .moa
        .aggregator_key()
        .ok_or_else(|| ProviderError::NotConfigured("moa.aggregator is not set".into()))?;
    let aggregator = router.require(aggregator_key)?;

    let moa = MixtureOfAgents::new(references, aggregator, MoaSettings::from_config(&config.moa))?;
    info!(
        references = ?moa.reference_keys(),
        aggregator = %moa.aggregator_key(),
        layers = config.moa.num_layers,
        "Using mixture of agents"
    );
    Ok(GenerationStrategy::Aggregated(Arc::new(moa)))
}

/// Get the default base URL for well-known backends.
fn default_base_url(backend_key: &str) -> String {
    match backend_key {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
