//! Shell tool: execute commands in the workspace.
//!
//! Supports command allowlisting and a per-tool timeout. The child is
//! killed when the call is dropped, so interrupts and timeouts do not
//! leave stray processes behind.

use async_trait::async_trait;
use std::time::Duration;
use stride_core::error::ToolError;
use stride_core::tool::{Tool, ToolOutput};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::workspace::Workspace;

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    workspace: Workspace,
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Option<Duration>,
}

impl ShellTool {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            allowed_commands: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_allowlist(mut self, allowed_commands: Vec<String>) -> Self {
        self.allowed_commands = allowed_commands;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, "Executing shell command");

        let output = Command::new("sh")
            .args(["-c", command])
            .current_dir(self.workspace.root())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            return Err(ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: format!("[exit code: {code}]\n{stdout}\n{stderr}").trim().to_string(),
            });
        }

        let text = if stderr.is_empty() {
            stdout
        } else {
            format!("{stdout}\n[stderr]: {stderr}")
        };
        Ok(ToolOutput::Text(text.trim().to_string()))
    }
}
