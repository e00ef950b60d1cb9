//! Retry and health tracking around any backend.
//!
//! [`ModelBackend`] wraps a [`Provider`] with a per-attempt timeout, an
//! exponential backoff retry budget and success/failure counters. It is
//! itself a `Provider`, so the turn loop can use a single wrapped backend
//! directly and the aggregation layer wraps each of its members.

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stride_config::RetryConfig;
use stride_core::error::ProviderError;
use stride_core::provider::{GenerationRequest, GenerationResponse, Provider};
use tracing::{debug, warn};

/// How many times to retry, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay to randomize, 0.0..=1.0
    pub jitter: f64,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// A rate limit's `retry_after` is honored up to `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        let jittered = if self.jitter > 0.0 {
            let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
            exponential.mul_f64(factor.max(0.0)).min(self.max_delay)
        } else {
            exponential
        };

        match error {
            ProviderError::RateLimited { retry_after_secs } => jittered
                .max(Duration::from_secs(*retry_after_secs))
                .min(self.max_delay),
            _ => jittered,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Point-in-time view of a backend's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendHealth {
    pub backend: String,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub consecutive_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl BackendHealth {
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct HealthCounters {
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    consecutive_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// A backend with its own retry budget and health counters.
pub struct ModelBackend {
    key: String,
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
    timeout: Duration,
    counters: HealthCounters,
}

impl ModelBackend {
    pub fn new(key: impl Into<String>, inner: Arc<dyn Provider>) -> Self {
        Self {
            key: key.into(),
            inner,
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(120),
            counters: HealthCounters::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-attempt wall-clock limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn health(&self) -> BackendHealth {
        BackendHealth {
            backend: self.key.clone(),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::Relaxed),
            last_error: self
                .counters
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    async fn attempt(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "Backend '{}' timed out after {}s",
                self.key,
                self.timeout.as_secs()
            ))),
        }
    }

    fn record_success(&self) {
        self.counters.successes.fetch_add(1, Ordering::Relaxed);
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &ProviderError) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        self.counters.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self
            .counters
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }
}

#[async_trait]
impl Provider for ModelBackend {
    fn name(&self) -> &str {
        &self.key
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.attempt(request.clone()).await {
                Ok(response) => {
                    self.record_success();
                    debug!(backend = %self.key, attempts = attempt + 1, "Backend call succeeded");
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt, &e);
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        backend = %self.key,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.record_failure(&e);
                    warn!(backend = %self.key, attempts = attempt + 1, error = %e, "Backend call failed");
                    return Err(e);
                }
            }
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
