//! Provider trait: the abstraction over generation backends.
//!
//! A Provider takes the conversation so far and returns the content blocks
//! the model produced. Single backends, retry wrappers and the
//! mixture-of-agents layer all implement it, so the turn loop never knows
//! which one it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ContentBlock, MessageGroup};
use crate::tool::{ToolCall, ToolDescriptor};

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The conversation so far
    pub messages: Vec<MessageGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerationRequest {
    pub fn new(messages: Vec<MessageGroup>) -> Self {
        Self {
            messages,
            system_prompt: None,
            max_tokens: None,
            temperature: default_temperature(),
            tools: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// The generated content, in model order
    pub blocks: Vec<ContentBlock>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,

    /// Provider-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GenerationResponse {
    pub fn new(blocks: Vec<ContentBlock>, model: impl Into<String>) -> Self {
        Self {
            blocks,
            usage: None,
            model: model.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.blocks.iter().filter_map(ContentBlock::as_tool_call).collect()
    }

    /// No usable text and no tool calls.
    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty() && self.tool_calls().is_empty()
    }

    pub fn output_tokens(&self) -> u32 {
        self.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "moa").
    fn name(&self) -> &str;

    /// Generate one response for the request.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
