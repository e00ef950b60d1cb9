//! Built-in tools for Stride.
//!
//! Every tool is scoped to a single workspace directory. Read-only tools
//! (`file_read`, `list_dir`, `complete`) may run concurrently; anything
//! that mutates the workspace runs serially and, by default, asks for
//! confirmation first.

pub mod complete;
pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod shell;
pub mod workspace;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stride_core::error::ToolError;
use stride_core::tool::ToolRegistry;

pub use complete::{COMPLETE_TOOL_NAME, CompleteTool};
pub use workspace::Workspace;

/// Default per-command timeout for the shell tool.
const SHELL_TIMEOUT: Duration = Duration::from_secs(120);

/// Create a registry with all built-in tools rooted at `workspace_root`.
pub fn default_registry(workspace_root: &Path) -> Result<ToolRegistry, ToolError> {
    let workspace = Workspace::new(workspace_root);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(file_read::FileReadTool::new(workspace.clone())))?;
    registry.register(Arc::new(list_dir::ListDirTool::new(workspace.clone())))?;
    registry.register(Arc::new(file_write::FileWriteTool::new(workspace.clone())))?;
    registry.register(Arc::new(shell::ShellTool::new(workspace).with_timeout(SHELL_TIMEOUT)))?;
    registry.register(Arc::new(CompleteTool))?;
    Ok(registry)
}
