//! OpenAI-compatible backend.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, Together AI and any other
//! endpoint that speaks `/chat/completions` with function calling.
//! Content blocks are mapped to the chat wire format here and nowhere else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stride_core::error::ProviderError;
use stride_core::message::{ContentBlock, MessageGroup, Role};
use stride_core::provider::{GenerationRequest, GenerationResponse, Provider, Usage};
use stride_core::tool::{ToolCall, ToolDescriptor};
use tracing::{debug, warn};

/// A backend reachable through an OpenAI-compatible HTTP API.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert message groups to chat messages.
    ///
    /// Tool results become one `tool` message each; thinking blocks are not
    /// sent back.
    fn to_api_messages(system_prompt: Option<&str>, groups: &[MessageGroup]) -> Vec<ApiMessage> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ApiMessage::text("system", system));
        }

        for group in groups {
            match group.role {
                Role::User => {
                    for block in &group.blocks {
                        if let ContentBlock::ToolResult(result) = block {
                            messages.push(ApiMessage {
                                role: "tool".into(),
                                content: Some(result.output.render()),
                                tool_calls: None,
                                tool_call_id: Some(result.call_id.clone()),
                            });
                        }
                    }
                    let text = group.text();
                    if !text.is_empty() {
                        messages.push(ApiMessage::text("user", &text));
                    }
                }
                Role::Assistant => {
                    let tool_calls: Vec<ApiToolCall> = group
                        .tool_calls()
                        .map(|call| ApiToolCall {
                            id: call.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: call.name.clone(),
                                arguments: call.input.to_string(),
                            },
                        })
                        .collect();
                    let text = group.text();
                    messages.push(ApiMessage {
                        role: "assistant".into(),
                        content: (!text.is_empty()).then_some(text),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    });
                }
            }
        }
        messages
    }

    /// Convert tool descriptors to OpenAI API format.
    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn to_blocks(message: ApiMessage) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::Text { text });
        }
        for call in message.tool_calls.unwrap_or_default() {
            let arguments = call.function.arguments;
            let input = if arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&arguments).unwrap_or(serde_json::Value::String(arguments))
            };
            blocks.push(ContentBlock::ToolCall(ToolCall::new(call.id, call.function.name, input)));
        }
        blocks
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request.system_prompt.as_deref(), &request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(backend = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        match status {
            200 => {}
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                return Err(ProviderError::RateLimited { retry_after_secs });
            }
            401 | 403 => {
                return Err(ProviderError::AuthenticationFailed(
                    "Invalid API key or insufficient permissions".into(),
                ));
            }
            402 => {
                return Err(ProviderError::QuotaExceeded(response.text().await.unwrap_or_default()));
            }
            404 => return Err(ProviderError::ModelNotFound(self.model.clone())),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(backend = %self.name, status, body = %error_body, "Backend returned error");
                return Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                });
            }
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let mut generated = GenerationResponse::new(Self::to_blocks(choice.message), api_response.model);
        generated.usage = usage;
        Ok(generated)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::tool::{ToolOutput, ToolResult};

    #[test]
    fn constructor_trims_base_url() {
        let provider =
            OpenAiCompatProvider::new("openai", "https://api.openai.com/v1/", "sk-test", "gpt-4o").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.model(), "gpt-4o");
    }

    #[test]
    fn system_prompt_goes_first() {
        let groups = vec![MessageGroup::user_text("Hello")];
        let api = OpenAiCompatProvider::to_api_messages(Some("Be brief"), &groups);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[1].content.as_deref(), Some("Hello"));
    }

    #[test]
    fn tool_calls_and_results_map_to_chat_format() {
        let call = ToolCall::new("call_1", "file_read", serde_json::json!({"path": "a.txt"}));
        let groups = vec![
            MessageGroup::user_text("read a.txt"),
            MessageGroup::new(
                Role::Assistant,
                vec![
                    ContentBlock::Thinking { thinking: "easy".into(), signature: None },
                    ContentBlock::ToolCall(call.clone()),
                ],
            ),
            MessageGroup::new(
                Role::User,
                vec![ContentBlock::ToolResult(ToolResult::success(&call, ToolOutput::text("contents")))],
            ),
        ];

        let api = OpenAiCompatProvider::to_api_messages(None, &groups);
        assert_eq!(api.len(), 3);

        assert_eq!(api[1].role, "assistant");
        assert!(api[1].content.is_none());
        let tool_calls = api[1].tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "file_read");
        assert_eq!(tool_calls[0].function.arguments, r#"{"path":"a.txt"}"#);

        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api[2].content.as_deref(), Some("contents"));
    }

    #[test]
    fn tool_descriptor_conversion() {
        let tools = vec![ToolDescriptor {
            name: "shell".into(),
            description: "Run a shell command".into(),
            input_schema: serde_json::json!({"type": "object"}),
            read_only: false,
            requires_confirmation: true,
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "shell");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn response_parses_into_blocks() {
        let data = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {
                "role": "assistant",
                "content": "Checking both.",
                "tool_calls": [
                    {"id": "call_a", "type": "function", "function": {"name": "file_read", "arguments": "{\"path\":\"x\"}"}},
                    {"id": "call_b", "type": "function", "function": {"name": "list_dir", "arguments": ""}}
                ]
            }}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.usage.as_ref().unwrap().completion_tokens, 5);

        let message = parsed.choices.into_iter().next().unwrap().message;
        let blocks = OpenAiCompatProvider::to_blocks(message);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].as_text(), Some("Checking both."));
        let first = blocks[1].as_tool_call().unwrap();
        assert_eq!(first.input["path"], "x");
        let second = blocks[2].as_tool_call().unwrap();
        assert_eq!(second.input, serde_json::json!({}));
    }

    #[test]
    fn malformed_arguments_are_kept_as_string() {
        let message = ApiMessage {
            role: "assistant".into(),
            content: None,
            tool_calls: Some(vec![ApiToolCall {
                id: "c".into(),
                r#type: "function".into(),
                function: ApiFunction { name: "shell".into(), arguments: "{not json".into() },
            }]),
            tool_call_id: None,
        };
        let blocks = OpenAiCompatProvider::to_blocks(message);
        assert_eq!(blocks[0].as_tool_call().unwrap().input, serde_json::json!("{not json"));
    }
}
