//! File read tool: read file contents from inside the workspace.

use async_trait::async_trait;
use stride_core::error::ToolError;
use stride_core::tool::{Tool, ToolOutput};

use crate::workspace::Workspace;

pub struct FileReadTool {
    workspace: Workspace,
}

impl FileReadTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace. Optionally pass `offset` and `limit` to read a range of lines."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace root"
                },
                "offset": {
                    "type": "integer",
                    "description": "First line to return (0-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"]
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let resolved = self.workspace.resolve(self.name(), path)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Failed to read file '{path}': {e}"),
            })?;

        let offset = arguments["offset"].as_u64().map(|n| n as usize);
        let limit = arguments["limit"].as_u64().map(|n| n as usize);
        if offset.is_none() && limit.is_none() {
            return Ok(ToolOutput::Text(content));
        }

        let selected = content
            .lines()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput::Text(selected))
    }
}
