//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! read files, run commands, finish a task. The dispatcher only needs the
//! capability flags (`is_read_only`, `requires_confirmation`) and `execute`;
//! everything else here is what gets advertised to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToolError;

/// Reported for every call that was cut short by the abort signal.
pub const TOOL_INTERRUPTED_MESSAGE: &str = "Tool execution interrupted by user.";

/// A request to execute a tool, as proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID within the turn (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Structured input
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// One part of a multi-part tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputPart {
    Text { text: String },
    /// Base64-encoded image data.
    Image { media_type: String, data: String },
}

/// What a tool hands back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Parts(Vec<OutputPart>),
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Flatten to plain text. Images become placeholders.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    OutputPart::Text { text } => text.clone(),
                    OutputPart::Image { media_type, .. } => {
                        format!("[Image attached - {media_type}]")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    /// The tool ran and reported an error.
    Failed,
    /// The per-call timeout elapsed.
    TimedOut,
    /// The abort signal fired before the call could finish.
    Interrupted,
    /// No tool with that name is registered.
    Unavailable,
    /// The confirmation gate refused the call.
    Denied,
}

/// The result of a tool call. Exactly one per call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The tool that was (or would have been) invoked
    pub tool_name: String,

    /// The output content
    pub output: ToolOutput,

    pub status: ToolStatus,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: ToolOutput) -> Self {
        Self::with_status(call, output, ToolStatus::Success)
    }

    pub fn failed(call: &ToolCall, reason: impl Into<String>) -> Self {
        Self::with_status(call, ToolOutput::Text(reason.into()), ToolStatus::Failed)
    }

    pub fn timed_out(call: &ToolCall, timeout: Duration) -> Self {
        let message = format!(
            "Tool '{}' timed out after {}s. The operation may still be running; \
             check its status or retry with a longer timeout.",
            call.name,
            timeout.as_secs()
        );
        Self::with_status(call, ToolOutput::Text(message), ToolStatus::TimedOut)
    }

    pub fn interrupted(call: &ToolCall) -> Self {
        Self::with_status(
            call,
            ToolOutput::text(TOOL_INTERRUPTED_MESSAGE),
            ToolStatus::Interrupted,
        )
    }

    pub fn unavailable(call: &ToolCall) -> Self {
        let message = format!("Tool '{}' is not available", call.name);
        Self::with_status(call, ToolOutput::Text(message), ToolStatus::Unavailable)
    }

    pub fn denied(call: &ToolCall) -> Self {
        let message = format!("Execution of '{}' was not approved", call.name);
        Self::with_status(call, ToolOutput::Text(message), ToolStatus::Denied)
    }

    fn with_status(call: &ToolCall, output: ToolOutput, status: ToolStatus) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output,
            status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != ToolStatus::Success
    }
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// The core Tool trait.
///
/// Tools are registered in a [`ToolRegistry`] at startup and looked up by
/// name when the model proposes a call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Tools that never mutate anything may run concurrently with each other.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether a human has to approve each call.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Per-tool override of the dispatcher's default timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> std::result::Result<ToolOutput, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
            read_only: self.is_read_only(),
            requires_confirmation: self.requires_confirmation(),
        }
    }
}

/// A registry of available tools, built once and shared by reference.
///
/// Registration order is preserved so the descriptors sent to the model are
/// stable between turns.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// `None` when the tool is unknown.
    pub fn is_read_only(&self, name: &str) -> Option<bool> {
        self.index.get(name).map(|&i| self.tools[i].is_read_only())
    }

    /// Descriptors for every tool, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Decides whether a call to a confirmation-gated tool may proceed.
///
/// The dispatcher waits on the gate; the answer usually comes from a UI.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, call: &ToolCall, descriptor: &ToolDescriptor) -> bool;
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, _call: &ToolCall, _descriptor: &ToolDescriptor) -> bool {
        true
    }
}
