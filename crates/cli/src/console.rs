//! Terminal input shared by the prompt loop and the confirmation gate.

use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use stride_core::tool::{ConfirmationGate, ToolCall, ToolDescriptor};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Line reader over stdin. Clones share one buffer, so nothing typed for
/// one reader is swallowed by another.
#[derive(Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
}

impl ConsoleInput {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    /// Print `prompt` and read one line. `None` at end of input.
    pub async fn read_line(&self, prompt: &str) -> std::io::Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        self.lines.lock().await.next_line().await
    }
}

/// Asks on the terminal before a gated tool runs.
pub struct ConsoleGate {
    input: ConsoleInput,
}

impl ConsoleGate {
    pub fn new(input: ConsoleInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ConfirmationGate for ConsoleGate {
    async fn confirm(&self, call: &ToolCall, descriptor: &ToolDescriptor) -> bool {
        println!();
        println!("  Tool:  {}", descriptor.name);
        println!("  Input: {}", summarize_input(&call.input));
        match self.input.read_line("  Allow? [y/N] ").await {
            Ok(Some(answer)) => is_affirmative(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read confirmation");
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

const MAX_INPUT_PREVIEW: usize = 400;

fn summarize_input(input: &serde_json::Value) -> String {
    let rendered = input.to_string();
    if rendered.chars().count() <= MAX_INPUT_PREVIEW {
        return rendered;
    }
    let preview: String = rendered.chars().take(MAX_INPUT_PREVIEW).collect();
    format!("{preview}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES \n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
    }

    #[test]
    fn long_inputs_are_truncated() {
        let input = serde_json::json!({"content": "x".repeat(1000)});
        let summary = summarize_input(&input);
        assert_eq!(summary.chars().count(), MAX_INPUT_PREVIEW + 1);
        assert!(summary.ends_with('…'));

        let short = serde_json::json!({"command": "ls"});
        assert_eq!(summarize_input(&short), r#"{"command":"ls"}"#);
    }
}
