//! # Stride Core
//!
//! Domain types, traits, and error definitions for the Stride agent
//! execution core. Everything the turn loop, the tool dispatcher and the
//! aggregation layer agree on lives here; implementations live in their
//! respective crates.
//!
//! - [`message`]: content blocks and the append-only conversation state
//! - [`tool`]: the tool capability trait, registry and confirmation gate
//! - [`provider`]: the generation backend trait
//! - [`event`]: lifecycle events and the in-process event bus
//! - [`signal`]: the resettable abort signal
//! - [`runtime`]: the sandbox lifecycle contract

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod runtime;
pub mod signal;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, RuntimeError, SubscriberError, ToolError};
pub use event::{
    AsyncEventSubscriber, Event, EventBus, EventId, EventPayload, EventSource, EventSubscriber,
    SubscriptionId,
};
pub use message::{ContentBlock, ConversationId, ConversationState, MessageGroup, Role};
pub use provider::{GenerationRequest, GenerationResponse, Provider, Usage};
pub use runtime::{LocalRuntime, RuntimeStatus, SandboxRuntime};
pub use signal::AbortSignal;
pub use tool::{
    AutoApprove, ConfirmationGate, OutputPart, Tool, ToolCall, ToolDescriptor, ToolOutput,
    ToolRegistry, ToolResult, ToolStatus,
};
