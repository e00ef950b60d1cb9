//! Lifecycle events and the in-process event bus.
//!
//! The turn loop publishes an [`Event`] for everything observable it does.
//! Observers (persistence, live connections, logging) subscribe to the
//! [`EventBus`] and never block or break the loop.
//!
//! Delivery rules:
//! - `publish` takes a snapshot of the subscriber set, so a subscriber
//!   registered after an event was published never sees that event, and an
//!   unsubscribe never affects a publish that is already running.
//! - Synchronous subscribers run inline, before `publish` returns.
//! - Asynchronous subscribers each own a worker task fed by an unbounded
//!   queue; `publish` only enqueues. Per-subscriber order is publish order.
//! - Errors and panics in a subscriber are logged and swallowed.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SubscriberError;
use crate::tool::{ToolCall, ToolResult};

/// Unique event identifier, assigned once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    User,
    Agent,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Raw user input
    UserMessage { text: String },
    AgentMessage { text: String },
    AgentThinking { text: String },
    ToolCall { call: ToolCall },
    ToolResult { result: ToolResult },
    AgentInterrupted { message: String },
    /// The run hit its turn or output-token limit.
    Truncated { reason: String, turns: u32 },
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_text: Option<String>,
        turns: u32,
    },
    Error { message: String },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AgentMessage { .. } => "agent_message",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::AgentInterrupted { .. } => "agent_interrupted",
            Self::Truncated { .. } => "truncated",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}

/// An immutable record of something that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    timestamp: DateTime<Utc>,
    source: EventSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<EventId>,
    #[serde(flatten)]
    payload: EventPayload,
}

impl Event {
    pub fn new(source: EventSource, payload: EventPayload) -> Self {
        Self {
            id: EventId(Uuid::new_v4()),
            timestamp: Utc::now(),
            source,
            cause: None,
            payload,
        }
    }

    /// Link this event to the event that caused it.
    pub fn with_cause(mut self, cause: EventId) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn cause(&self) -> Option<EventId> {
        self.cause
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Handle returned by `subscribe*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscriber invoked inline by `publish`. Keep it cheap.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<(), SubscriberError>;
}

/// A subscriber that runs on its own worker task.
#[async_trait::async_trait]
pub trait AsyncEventSubscriber: Send + Sync {
    async fn handle_event(&self, event: Arc<Event>) -> Result<(), SubscriberError>;
}

struct FnSubscriber<F>(F);

impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        (self.0)(event);
        Ok(())
    }
}

#[derive(Clone)]
enum Delivery {
    Inline(Arc<dyn EventSubscriber>),
    Queued(mpsc::UnboundedSender<Arc<Event>>),
}

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    delivery: Delivery,
}

#[derive(Default)]
struct Registry {
    // Replaced wholesale on every change; publishers hold the old Arc.
    subscribers: Mutex<Arc<Vec<Registration>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Registration>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Arc<Vec<Registration>> {
        Arc::clone(&self.lock())
    }

    fn insert(&self, delivery: Delivery) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.lock();
        let mut next = Vec::clone(&guard);
        next.push(Registration { id, delivery });
        *guard = Arc::new(next);
        id
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut guard = self.lock();
        if !guard.iter().any(|r| r.id == id) {
            return false;
        }
        let next = guard.iter().filter(|r| r.id != id).cloned().collect();
        *guard = Arc::new(next);
        true
    }
}

/// Publish/subscribe hub. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = self.registry.insert(Delivery::Inline(subscriber));
        debug!(subscription = %id, "Subscriber registered");
        id
    }

    /// Register a closure as a synchronous subscriber.
    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber(f)))
    }

    /// Register an asynchronous subscriber.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the subscriber's worker
    /// task is spawned immediately.
    pub fn subscribe_async(&self, subscriber: Arc<dyn AsyncEventSubscriber>) -> SubscriptionId {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.registry.insert(Delivery::Queued(tx));
        let handle = tokio::spawn(run_worker(Arc::downgrade(&self.registry), id, subscriber, rx));
        self.registry
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        debug!(subscription = %id, "Async subscriber registered");
        id
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.snapshot().len()
    }

    /// Deliver an event to every subscriber registered right now.
    pub fn publish(&self, event: Event) -> EventId {
        let id = event.id();
        let event = Arc::new(event);
        let snapshot = self.registry.snapshot();

        for registration in snapshot.iter() {
            match &registration.delivery {
                Delivery::Inline(subscriber) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event)));
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(SubscriberError::Detached)) => {
                            self.unsubscribe(registration.id);
                        }
                        Ok(Err(e)) => warn!(
                            subscription = %registration.id,
                            event = event.kind(),
                            error = %e,
                            "Event subscriber failed"
                        ),
                        Err(_) => warn!(
                            subscription = %registration.id,
                            event = event.kind(),
                            "Event subscriber panicked"
                        ),
                    }
                }
                Delivery::Queued(tx) => {
                    if tx.send(Arc::clone(&event)).is_err() {
                        self.unsubscribe(registration.id);
                    }
                }
            }
        }
        id
    }

    /// Drop every subscription and wait for async workers to drain their
    /// queues.
    pub async fn shutdown(&self) {
        *self.registry.lock() = Arc::new(Vec::new());
        let workers: Vec<_> = self
            .registry
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Subscriber worker ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

async fn run_worker(
    registry: Weak<Registry>,
    id: SubscriptionId,
    subscriber: Arc<dyn AsyncEventSubscriber>,
    mut rx: mpsc::UnboundedReceiver<Arc<Event>>,
) {
    while let Some(event) = rx.recv().await {
        let kind = event.kind();
        let outcome = AssertUnwindSafe(subscriber.handle_event(event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(SubscriberError::Detached)) => {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(id);
                }
                debug!(subscription = %id, "Subscriber detached");
                break;
            }
            Ok(Err(e)) => warn!(subscription = %id, event = kind, error = %e, "Event subscriber failed"),
            Err(_) => warn!(subscription = %id, event = kind, "Event subscriber panicked"),
        }
    }
}
