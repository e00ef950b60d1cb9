//! Shared test helpers for driver and subscriber tests.

use std::sync::Mutex;
use std::time::Duration;
use stride_core::error::ProviderError;
use stride_core::message::ContentBlock;
use stride_core::provider::{GenerationRequest, GenerationResponse, Provider, Usage};
use stride_core::tool::ToolCall;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `generate` returns the next scripted outcome. Once the
/// script runs out the last outcome repeats, so a single tool-call
/// response makes a model that never finishes.
pub struct SequentialMockProvider {
    script: Vec<Result<GenerationResponse, ProviderError>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<GenerationResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(script: Vec<Result<GenerationResponse, ProviderError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one outcome");
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len().min(self.script.len() - 1);
        requests.push(request);
        self.script[index].clone()
    }
}

/// Never answers; used to abort mid-generation.
pub struct StalledProvider;

#[async_trait::async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Timeout("stalled".into()))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> GenerationResponse {
    make_response(vec![ContentBlock::text(text)])
}

/// Create a response with a thought followed by tool calls.
pub fn make_tool_call_response(thought: &str, calls: Vec<ToolCall>) -> GenerationResponse {
    let mut blocks = vec![ContentBlock::text(thought)];
    blocks.extend(calls.into_iter().map(ContentBlock::ToolCall));
    make_response(blocks)
}

pub fn make_response(blocks: Vec<ContentBlock>) -> GenerationResponse {
    let mut response = GenerationResponse::new(blocks, "mock-model");
    response.usage = Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    });
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, input)
}
