//! Stock event-bus subscribers.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stride_core::error::SubscriberError;
use stride_core::event::{AsyncEventSubscriber, Event, EventPayload, EventSubscriber};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Mirrors every event into the log.
#[derive(Debug, Default)]
pub struct TracingSubscriber;

impl EventSubscriber for TracingSubscriber {
    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        let id = event.id();
        match event.payload() {
            EventPayload::UserMessage { text } => info!(event = %id, chars = text.len(), "User message"),
            EventPayload::AgentMessage { text } => debug!(event = %id, text = %text, "Agent message"),
            EventPayload::AgentThinking { text } => debug!(event = %id, chars = text.len(), "Agent thinking"),
            EventPayload::ToolCall { call } => {
                info!(event = %id, tool = %call.name, call_id = %call.id, "Tool call")
            }
            EventPayload::ToolResult { result } => info!(
                event = %id,
                tool = %result.tool_name,
                call_id = %result.call_id,
                status = ?result.status,
                "Tool result"
            ),
            EventPayload::AgentInterrupted { .. } => info!(event = %id, "Agent interrupted"),
            EventPayload::Truncated { reason, turns } => {
                warn!(event = %id, turns, reason = %reason, "Agent run truncated")
            }
            EventPayload::Completed { turns, .. } => info!(event = %id, turns, "Agent run completed"),
            EventPayload::Error { message } => warn!(event = %id, error = %message, "Agent error"),
        }
        Ok(())
    }
}

/// Appends every event to a JSON Lines file.
pub struct JsonlPersistenceSubscriber {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlPersistenceSubscriber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> std::io::Result<tokio::fs::File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }
}

#[async_trait]
impl AsyncEventSubscriber for JsonlPersistenceSubscriber {
    async fn handle_event(&self, event: Arc<Event>) -> Result<(), SubscriberError> {
        let mut line = serde_json::to_string(event.as_ref())
            .map_err(|e| SubscriberError::Failed(format!("serialize event: {e}")))?;
        line.push('\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = self
                .open()
                .await
                .map_err(|e| SubscriberError::Failed(format!("open {}: {e}", self.path.display())))?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            let written = async {
                file.write_all(line.as_bytes()).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                // Reopen on the next event.
                *guard = None;
                return Err(SubscriberError::Failed(format!("write {}: {e}", self.path.display())));
            }
        }
        Ok(())
    }
}

/// Forwards events to a live client as JSON.
///
/// Raw user input is not echoed back. Once the receiving side is dropped
/// the subscriber detaches itself from the bus.
pub struct LiveConnectionSubscriber {
    sender: mpsc::UnboundedSender<String>,
}

impl LiveConnectionSubscriber {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    /// A subscriber plus the receiving end a connection handler drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSubscriber for LiveConnectionSubscriber {
    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        if matches!(event.payload(), EventPayload::UserMessage { .. }) {
            return Ok(());
        }
        if self.sender.is_closed() {
            debug!("Live connection closed, detaching");
            return Err(SubscriberError::Detached);
        }
        let json = serde_json::to_string(event).map_err(|e| SubscriberError::Failed(e.to_string()))?;
        self.sender.send(json).map_err(|_| SubscriberError::Detached)
    }
}
