//! Content blocks and the conversation state.
//!
//! A conversation is an ordered list of message groups. Each group holds the
//! blocks one participant produced in one go: text, thinking, tool calls from
//! the assistant, tool results from the environment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a message group. Tool results travel in user groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageGroup {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
}

impl MessageGroup {
    pub fn new(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            blocks,
            timestamp: Utc::now(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.blocks.iter().filter_map(ContentBlock::as_tool_call)
    }
}

/// The conversation one driver owns. Append-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    id: ConversationId,
    groups: Vec<MessageGroup>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn groups(&self) -> &[MessageGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn push(&mut self, group: MessageGroup) {
        self.groups.push(group);
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.push(MessageGroup::user_text(text));
    }

    pub fn push_assistant_text(&mut self, text: impl Into<String>) {
        self.push(MessageGroup::assistant_text(text));
    }

    pub fn push_assistant(&mut self, blocks: Vec<ContentBlock>) {
        self.push(MessageGroup::new(Role::Assistant, blocks));
    }

    /// Append tool results as one user group, in the order given.
    pub fn push_tool_results(&mut self, results: Vec<ToolResult>) {
        let blocks = results.into_iter().map(ContentBlock::ToolResult).collect();
        self.push(MessageGroup::new(Role::User, blocks));
    }

    /// Text of the most recent user group that carries text.
    pub fn last_user_text(&self) -> Option<String> {
        last_user_text(&self.groups)
    }

    /// Tool calls that have no result in the group that follows them.
    pub fn unanswered_tool_calls(&self) -> Vec<&ToolCall> {
        let mut unanswered = Vec::new();
        for (i, group) in self.groups.iter().enumerate() {
            if group.role != Role::Assistant {
                continue;
            }
            let answered: Vec<&str> = self
                .groups
                .get(i + 1)
                .map(|next| {
                    next.blocks
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::ToolResult(r) => Some(r.call_id.as_str()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            unanswered.extend(group.tool_calls().filter(|c| !answered.contains(&c.id.as_str())));
        }
        unanswered
    }
}

/// Text of the most recent user group in `groups` that carries text.
/// Tool-result groups have no text and are skipped.
pub fn last_user_text(groups: &[MessageGroup]) -> Option<String> {
    groups
        .iter()
        .rev()
        .filter(|g| g.role == Role::User)
        .map(MessageGroup::text)
        .find(|t| !t.is_empty())
}
