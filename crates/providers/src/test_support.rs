//! Mock backends shared by the provider tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use stride_core::error::ProviderError;
use stride_core::message::{ContentBlock, MessageGroup};
use stride_core::provider::{GenerationRequest, GenerationResponse, Provider, Usage};

pub(crate) fn request(text: &str) -> GenerationRequest {
    GenerationRequest::new(vec![MessageGroup::user_text(text)])
}

pub(crate) fn text_response(text: &str, model: &str) -> GenerationResponse {
    let mut response = GenerationResponse::new(vec![ContentBlock::text(text)], model);
    response.usage = Some(Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 });
    response
}

/// Always answers with the same text, optionally after a delay.
pub(crate) struct ReplyBackend {
    name: String,
    reply: String,
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ReplyBackend {
    pub(crate) fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ReplyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(text_response(&self.reply, &self.name))
    }
}

/// Fails the first `failures` calls, then answers.
pub(crate) struct FlakyBackend {
    name: String,
    error: ProviderError,
    failures: Mutex<u32>,
    calls: Mutex<usize>,
}

impl FlakyBackend {
    pub(crate) fn new(name: &str, failures: u32, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
            failures: Mutex::new(failures),
            calls: Mutex::new(0),
        }
    }

    /// Never recovers.
    pub(crate) fn failing(name: &str, error: ProviderError) -> Self {
        Self::new(name, u32::MAX, error)
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Provider for FlakyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(self.error.clone());
        }
        Ok(text_response("recovered", &self.name))
    }
}

/// Hangs forever (for timeout testing).
pub(crate) struct HangingBackend;

#[async_trait]
impl Provider for HangingBackend {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Network("unreachable".into()))
    }
}

/// Answers with no content at all.
pub(crate) struct EmptyBackend;

#[async_trait]
impl Provider for EmptyBackend {
    fn name(&self) -> &str {
        "empty"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        Ok(GenerationResponse::new(Vec::new(), "empty"))
    }
}
