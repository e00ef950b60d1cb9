//! Directory listing tool.

use async_trait::async_trait;
use stride_core::error::ToolError;
use stride_core::tool::{Tool, ToolOutput};

use crate::workspace::Workspace;

pub struct ListDirTool {
    workspace: Workspace,
}

impl ListDirTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories are suffixed with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace root (default: the root)"
                }
            }
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"].as_str().unwrap_or(".");
        let resolved = if path == "." {
            self.workspace.root().to_path_buf()
        } else {
            self.workspace.resolve(self.name(), path)?
        };

        let failed = |e: std::io::Error| ToolError::ExecutionFailed {
            tool_name: "list_dir".into(),
            reason: format!("Failed to list '{path}': {e}"),
        };

        let mut reader = tokio::fs::read_dir(&resolved).await.map_err(failed)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(failed)? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        if entries.is_empty() {
            return Ok(ToolOutput::text("(empty directory)"));
        }
        Ok(ToolOutput::Text(entries.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_entries_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let tool = ListDirTool::new(Workspace::new(dir.path()));
        let output = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(output.render(), "a.txt\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn lists_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("main.rs"), "").unwrap();

        let tool = ListDirTool::new(Workspace::new(dir.path()));
        let output = tool.execute(serde_json::json!({"path": "src"})).await.unwrap();
        assert_eq!(output.render(), "main.rs");
    }

    #[tokio::test]
    async fn empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool::new(Workspace::new(dir.path()));
        let output = tool.execute(serde_json::json!({"path": "."})).await.unwrap();
        assert_eq!(output.render(), "(empty directory)");
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool::new(Workspace::new(dir.path()));
        assert!(matches!(
            tool.execute(serde_json::json!({"path": "nope"})).await,
            Err(ToolError::ExecutionFailed { .. })
        ));
    }
}
