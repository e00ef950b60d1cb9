//! Tool dispatch: runs one batch of model-proposed tool calls.
//!
//! A batch runs concurrently only when every call targets a known,
//! read-only tool. Anything else (a mutating tool, an unknown name) makes
//! the whole batch run serially in call order, each call awaited before
//! the next starts. Concurrent batches keep at most `concurrency_limit`
//! calls in flight and start the next waiting call as soon as one
//! finishes.
//!
//! Every call yields exactly one [`ToolResult`], and results come back in
//! call order regardless of completion order.

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stride_config::AgentConfig;
use stride_core::tool::{AutoApprove, ConfirmationGate, ToolCall, ToolRegistry, ToolResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY_LIMIT: usize = 10;
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    concurrency_limit: usize,
    default_timeout: Duration,
    gate: Arc<dyn ConfirmationGate>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            gate: Arc::new(AutoApprove),
        }
    }

    /// Limit and timeout from the `[agent]` config section.
    pub fn from_config(registry: Arc<ToolRegistry>, config: &AgentConfig) -> Self {
        Self::new(registry)
            .with_concurrency_limit(config.tool_concurrency)
            .with_timeout(Duration::from_secs(config.tool_timeout_secs))
    }

    /// Clamped to at least one.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Applies to tools that do not declare their own timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_confirmation_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// True when every call names a registered read-only tool.
    pub fn runs_concurrently(&self, calls: &[ToolCall]) -> bool {
        calls
            .iter()
            .all(|call| self.registry.is_read_only(&call.name) == Some(true))
    }

    /// Execute a batch and return one result per call, in call order.
    ///
    /// Once `cancel` fires no further calls start, in-flight calls are
    /// dropped, and every call that did not finish is reported as
    /// interrupted.
    pub async fn dispatch(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }

        let concurrent = self.runs_concurrently(calls);
        info!(
            calls = calls.len(),
            mode = if concurrent { "concurrent" } else { "serial" },
            limit = self.concurrency_limit,
            "Dispatching tool calls"
        );

        if concurrent {
            self.dispatch_concurrent(calls, cancel).await
        } else {
            self.dispatch_serial(calls, cancel).await
        }
    }

    async fn dispatch_serial(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                results.push(ToolResult::interrupted(call));
                continue;
            }
            results.push(self.execute_one(call, cancel).await);
        }
        results
    }

    async fn dispatch_concurrent(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut waiting = calls.iter().enumerate();
        let mut running = FuturesUnordered::new();

        loop {
            // Refill up to the limit; the abort signal stops new starts.
            while running.len() < self.concurrency_limit && !cancel.is_cancelled() {
                let Some((index, call)) = waiting.next() else {
                    break;
                };
                running.push(async move { (index, self.execute_one(call, cancel).await) });
            }

            match running.next().await {
                Some((index, result)) => slots[index] = Some(result),
                None => break,
            }
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| slot.unwrap_or_else(|| ToolResult::interrupted(call)))
            .collect()
    }

    async fn execute_one(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        if cancel.is_cancelled() {
            return ToolResult::interrupted(call);
        }

        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Model called an unknown tool");
            return ToolResult::unavailable(call);
        };

        let descriptor = tool.descriptor();
        if descriptor.requires_confirmation {
            let approved = tokio::select! {
                biased;
                approved = self.gate.confirm(call, &descriptor) => approved,
                _ = cancel.cancelled() => return ToolResult::interrupted(call),
            };
            if !approved {
                info!(tool = %call.name, call_id = %call.id, "Tool call denied");
                return ToolResult::denied(call);
            }
        }

        let timeout = tool.timeout().unwrap_or(self.default_timeout);
        let started = Instant::now();
        debug!(tool = %call.name, call_id = %call.id, "Tool call started");

        let execution = AssertUnwindSafe(tool.execute(call.input.clone())).catch_unwind();
        let outcome = tokio::select! {
            biased;
            outcome = tokio::time::timeout(timeout, execution) => outcome,
            _ = cancel.cancelled() => {
                debug!(tool = %call.name, call_id = %call.id, "Tool call interrupted");
                return ToolResult::interrupted(call);
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(Ok(output))) => {
                debug!(tool = %call.name, call_id = %call.id, elapsed_ms, "Tool call finished");
                ToolResult::success(call, output)
            }
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, call_id = %call.id, elapsed_ms, error = %e, "Tool call failed");
                ToolResult::failed(call, format!("Error: {e}"))
            }
            Ok(Err(_)) => {
                warn!(tool = %call.name, call_id = %call.id, elapsed_ms, "Tool panicked");
                ToolResult::failed(call, format!("Error: tool '{}' crashed", call.name))
            }
            Err(_) => {
                warn!(tool = %call.name, call_id = %call.id, timeout_secs = timeout.as_secs(), "Tool call timed out");
                ToolResult::timed_out(call, timeout)
            }
        }
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.registry.names())
            .field("concurrency_limit", &self.concurrency_limit)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use stride_core::error::ToolError;
    use stride_core::tool::{Tool, ToolDescriptor, ToolOutput, ToolStatus};

    /// Sleeps for `delay_ms`, then echoes `text`. Records the order calls finish in.
    struct SleepTool {
        name: &'static str,
        read_only: bool,
        finished: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn is_read_only(&self) -> bool {
            self.read_only
        }
        async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let delay = input["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let text = input["text"].as_str().unwrap_or_default().to_string();
            self.finished.lock().unwrap().push(text.clone());
            Ok(ToolOutput::Text(text))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn is_read_only(&self) -> bool {
            true
        }
        async fn execute(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "panicky"
        }
        fn description(&self) -> &str {
            "panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn is_read_only(&self) -> bool {
            true
        }
        async fn execute(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
            panic!("tool bug");
        }
    }

    struct GatedTool;

    #[async_trait]
    impl Tool for GatedTool {
        fn name(&self) -> &str {
            "deploy"
        }
        fn description(&self) -> &str {
            "needs approval"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn requires_confirmation(&self) -> bool {
            true
        }
        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(2))
        }
        async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let delay = input["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(ToolOutput::text("deployed"))
        }
    }

    struct Deny;

    #[async_trait]
    impl ConfirmationGate for Deny {
        async fn confirm(&self, _call: &ToolCall, _descriptor: &ToolDescriptor) -> bool {
            false
        }
    }

    struct NeverAnswers;

    #[async_trait]
    impl ConfirmationGate for NeverAnswers {
        async fn confirm(&self, _call: &ToolCall, _descriptor: &ToolDescriptor) -> bool {
            std::future::pending().await
        }
    }

    fn dispatcher() -> (ToolDispatcher, Arc<Mutex<Vec<String>>>) {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(SleepTool { name: "read", read_only: true, finished: finished.clone() }))
            .unwrap();
        registry
            .register(Arc::new(SleepTool { name: "write", read_only: false, finished: finished.clone() }))
            .unwrap();
        registry.register(Arc::new(FailingTool)).unwrap();
        registry.register(Arc::new(PanickingTool)).unwrap();
        registry.register(Arc::new(GatedTool)).unwrap();
        (ToolDispatcher::new(Arc::new(registry)), finished)
    }

    fn call(id: &str, name: &str, text: &str, delay_ms: u64) -> ToolCall {
        ToolCall::new(id, name, serde_json::json!({"text": text, "delay_ms": delay_ms}))
    }

    #[tokio::test]
    async fn empty_batch_returns_nothing() {
        let (dispatcher, _) = dispatcher();
        assert!(dispatcher.dispatch(&[], &CancellationToken::new()).await.is_empty());
    }

    #[test]
    fn mode_selection() {
        let (dispatcher, _) = dispatcher();
        assert!(dispatcher.runs_concurrently(&[call("1", "read", "a", 0), call("2", "broken", "", 0)]));
        assert!(!dispatcher.runs_concurrently(&[call("1", "read", "a", 0), call("2", "write", "b", 0)]));
        assert!(!dispatcher.runs_concurrently(&[call("1", "read", "a", 0), call("2", "nope", "", 0)]));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_results_follow_call_order() {
        let (dispatcher, finished) = dispatcher();
        let calls = vec![
            call("c1", "read", "slow", 300),
            call("c2", "read", "fast", 10),
            call("c3", "read", "medium", 100),
        ];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(*finished.lock().unwrap(), vec!["fast", "medium", "slow"]);
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(results[0].output, ToolOutput::text("slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_tool_is_unavailable_and_forces_serial() {
        let (dispatcher, finished) = dispatcher();
        let calls = vec![
            call("c1", "read", "first", 300),
            call("c2", "ghost", "", 0),
            call("c3", "read", "second", 10),
        ];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(*finished.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(results[1].status, ToolStatus::Unavailable);
        assert!(results[1].output.render().contains("'ghost' is not available"));
        assert_eq!(results[2].status, ToolStatus::Success);
    }

    #[tokio::test]
    async fn tool_errors_do_not_abort_siblings() {
        let (dispatcher, _) = dispatcher();
        let calls = vec![call("c1", "broken", "", 0), call("c2", "read", "fine", 0)];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(results[0].status, ToolStatus::Failed);
        assert!(results[0].is_error());
        assert!(results[0].output.render().contains("disk on fire"));
        assert_eq!(results[1].status, ToolStatus::Success);
    }

    #[tokio::test]
    async fn panicking_tool_becomes_failed_result() {
        let (dispatcher, _) = dispatcher();
        let calls = vec![call("c1", "panicky", "", 0), call("c2", "read", "fine", 0)];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(results[0].status, ToolStatus::Failed);
        assert!(results[0].output.render().contains("crashed"));
        assert_eq!(results[1].status, ToolStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_yields_timed_out_result() {
        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_timeout(Duration::from_secs(1));
        let calls = vec![call("c1", "read", "late", 5_000), call("c2", "read", "ok", 10)];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(results[0].status, ToolStatus::TimedOut);
        assert!(results[0].output.render().contains("timed out after 1s"));
        assert_eq!(results[1].status, ToolStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_overrides_default() {
        let (dispatcher, _) = dispatcher();
        let calls = vec![ToolCall::new("c1", "deploy", serde_json::json!({"delay_ms": 3_000}))];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(results[0].status, ToolStatus::TimedOut);
        assert!(results[0].output.render().contains("after 2s"));
    }

    #[tokio::test]
    async fn denied_confirmation_skips_execution() {
        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_confirmation_gate(Arc::new(Deny));
        let calls = vec![ToolCall::new("c1", "deploy", serde_json::json!({})), call("c2", "write", "w", 0)];

        let results = dispatcher.dispatch(&calls, &CancellationToken::new()).await;

        assert_eq!(results[0].status, ToolStatus::Denied);
        assert_eq!(results[1].status, ToolStatus::Success);
    }

    #[tokio::test]
    async fn approved_confirmation_runs_tool() {
        let (dispatcher, _) = dispatcher();
        let results = dispatcher
            .dispatch(&[ToolCall::new("c1", "deploy", serde_json::json!({}))], &CancellationToken::new())
            .await;
        assert_eq!(results[0].output, ToolOutput::text("deployed"));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_while_waiting_for_confirmation_interrupts() {
        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_confirmation_gate(Arc::new(NeverAnswers));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let calls = vec![ToolCall::new("c1", "deploy", serde_json::json!({})), call("c2", "write", "w", 0)];
        let results = dispatcher.dispatch(&calls, &cancel).await;

        assert!(results.iter().all(|r| r.status == ToolStatus::Interrupted));
    }

    #[tokio::test(start_paused = true)]
    async fn serial_abort_interrupts_current_and_remaining_calls() {
        let (dispatcher, finished) = dispatcher();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let calls = vec![
            call("c1", "write", "one", 100),
            call("c2", "write", "two", 100),
            call("c3", "write", "three", 100),
        ];
        let results = dispatcher.dispatch(&calls, &cancel).await;

        assert_eq!(*finished.lock().unwrap(), vec!["one"]);
        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ToolStatus::Success, ToolStatus::Interrupted, ToolStatus::Interrupted]);
        assert_eq!(results[2].output.render(), stride_core::tool::TOOL_INTERRUPTED_MESSAGE);
    }

    #[tokio::test]
    async fn already_cancelled_batch_runs_nothing() {
        let (dispatcher, finished) = dispatcher();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = dispatcher.dispatch(&[call("c1", "read", "a", 0), call("c2", "read", "b", 0)], &cancel).await;

        assert!(finished.lock().unwrap().is_empty());
        assert!(results.iter().all(|r| r.status == ToolStatus::Interrupted));
    }

    #[test]
    fn concurrency_limit_is_at_least_one() {
        let (dispatcher, _) = dispatcher();
        assert_eq!(dispatcher.with_concurrency_limit(0).concurrency_limit(), 1);
    }

    #[test]
    fn from_config_reads_agent_section() {
        let config = AgentConfig { tool_concurrency: 4, tool_timeout_secs: 9, ..AgentConfig::default() };
        let dispatcher = ToolDispatcher::from_config(Arc::new(ToolRegistry::new()), &config);
        assert_eq!(dispatcher.concurrency_limit(), 4);
        assert_eq!(dispatcher.default_timeout, Duration::from_secs(9));
    }
}
