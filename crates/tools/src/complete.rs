//! The terminal tool. Calling it ends the run with the given answer.

use async_trait::async_trait;
use stride_core::error::ToolError;
use stride_core::tool::{Tool, ToolOutput};

pub const COMPLETE_TOOL_NAME: &str = "complete";

pub struct CompleteTool;

#[async_trait]
impl Tool for CompleteTool {
    fn name(&self) -> &str {
        COMPLETE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Call this once the task is finished. Pass the final answer for the user in `answer`."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The final answer or summary of the work done"
                }
            },
            "required": ["answer"]
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let answer = arguments["answer"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'answer' argument".into()))?;
        Ok(ToolOutput::text(answer))
    }
}
