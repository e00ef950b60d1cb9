//! File write tool: create or overwrite files inside the workspace.

use async_trait::async_trait;
use stride_core::error::ToolError;
use stride_core::tool::{Tool, ToolOutput};

use crate::workspace::Workspace;

pub struct FileWriteTool {
    workspace: Workspace,
    /// Writes need a confirmation round-trip unless this is cleared.
    confirm: bool,
}

impl FileWriteTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace, confirm: true }
    }

    pub fn without_confirmation(mut self) -> Self {
        self.confirm = false;
        self
    }

    fn failure(&self, reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file and missing parent directories, overwrites if it exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        self.confirm
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = self.workspace.resolve(self.name(), path)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failure(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| self.failure(format!("Failed to write file '{path}': {e}")))?;

        Ok(ToolOutput::Text(format!("Successfully wrote {} bytes to {path}", content.len())))
    }
}
