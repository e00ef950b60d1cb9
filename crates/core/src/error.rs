//! Error types for the Stride domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Stride operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Agent errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Sandbox runtime errors ---
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Aggregation failed: {0}")]
    AggregationFailed(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether another attempt against the same backend can succeed.
    ///
    /// Credential, model, quota and configuration problems will fail the
    /// same way on every attempt, so retry wrappers give up immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::InvalidResponse(_) => true,
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::QuotaExceeded(_)
            | Self::NotConfigured(_)
            | Self::AggregationFailed(_)
            | Self::Cancelled => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Tool calls without results: {}", .0.join(", "))]
    UnansweredToolCalls(Vec<String>),

    #[error("Generation failed: {0}")]
    Generation(#[from] ProviderError),
}

/// Returned by event subscribers. Never reaches the publisher.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Subscriber failed: {0}")]
    Failed(String),

    /// The subscriber's sink is gone; the bus drops the registration.
    #[error("Subscriber detached")]
    Detached,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime not created: {0}")]
    NotCreated(String),

    #[error("Runtime not running: {0}")]
    NotRunning(String),

    #[error("Port {0} cannot be exposed")]
    InvalidPort(u16),

    #[error("Runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
}
