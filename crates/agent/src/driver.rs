//! The turn loop.
//!
//! One [`AgentDriver`] owns one conversation. Each call to
//! [`AgentDriver::run`] appends the instruction and then repeats
//! generate → dispatch → append until one of these happens:
//!
//! - the model answers without tool calls, or a terminal tool succeeds
//!   (`Completed`)
//! - the turn limit or output-token budget is reached (`Truncated`)
//! - the abort signal fires (`Interrupted`)
//! - the generation strategy fails (`Err`, driver state `Rejected`)
//!
//! Everything that happens is published on the event bus. Publishing is
//! fire-and-forget from the loop's point of view.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use stride_config::AgentConfig;
use stride_core::error::{AgentError, Result};
use stride_core::event::{Event, EventBus, EventId, EventPayload, EventSource};
use stride_core::message::{ContentBlock, ConversationState};
use stride_core::provider::{GenerationRequest, GenerationResponse, Provider};
use stride_core::signal::AbortSignal;
use stride_core::tool::{ToolCall, ToolResult, ToolStatus};
use tracing::{debug, info, warn};

use crate::dispatch::ToolDispatcher;

/// Appended as an assistant message when a run is interrupted mid-generation.
pub const AGENT_INTERRUPTED_MESSAGE: &str =
    "Agent interrupted by user. You can resume by providing a new instruction.";

/// Appended when the turn limit or token budget ends a run.
pub const TRUNCATION_MESSAGE: &str = "Agent did not complete after max turns";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Ready,
    Generating,
    DispatchingTools,
    Finished,
    Rejected,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Truncated,
    Interrupted,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// The model's closing text, or the terminal tool's answer.
    pub final_text: Option<String>,
    /// Generations performed during this run.
    pub turns: u32,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens_per_turn: Option<u32>,
    pub max_turns: u32,
    pub max_output_tokens: Option<u64>,
    pub terminal_tools: Vec<String>,
}

impl DriverSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            system_prompt: Some(config.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
            temperature: config.temperature,
            max_tokens_per_turn: Some(config.max_tokens_per_turn),
            max_turns: config.max_turns.max(1),
            max_output_tokens: config.max_output_tokens,
            terminal_tools: config.terminal_tools.clone(),
        }
    }

    fn is_terminal(&self, tool_name: &str) -> bool {
        self.terminal_tools.iter().any(|t| t == tool_name)
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Drives one conversation.
pub struct AgentDriver {
    provider: Arc<dyn Provider>,
    dispatcher: ToolDispatcher,
    bus: EventBus,
    settings: DriverSettings,
    signal: AbortSignal,
    conversation: ConversationState,
    state: DriverState,
}

/// Per-run counters.
struct RunProgress {
    turns: u32,
    output_tokens: u64,
    /// The event the next published event is caused by.
    cause: EventId,
}

impl AgentDriver {
    pub fn new(provider: Arc<dyn Provider>, dispatcher: ToolDispatcher, bus: EventBus) -> Self {
        Self {
            provider,
            dispatcher,
            bus,
            settings: DriverSettings::default(),
            signal: AbortSignal::new(),
            conversation: ConversationState::new(),
            state: DriverState::Ready,
        }
    }

    pub fn with_settings(mut self, settings: DriverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an abort signal with whoever may interrupt this driver.
    pub fn with_abort_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Continue an existing conversation.
    pub fn with_conversation(mut self, conversation: ConversationState) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Run the loop for a new user instruction.
    ///
    /// A previous abort is cleared first, so an interrupted conversation
    /// resumes from where it stopped.
    pub async fn run(&mut self, instruction: impl Into<String>) -> Result<RunOutcome> {
        let instruction = instruction.into();
        self.signal.reset();
        let cancel = self.signal.token();
        self.state = DriverState::Ready;

        info!(
            conversation_id = %self.conversation.id(),
            provider = %self.provider.name(),
            "Starting agent run"
        );

        let cause = self.publish(
            Event::new(EventSource::User, EventPayload::UserMessage { text: instruction.clone() }),
            None,
        );
        self.conversation.push_user_text(instruction);

        let mut progress = RunProgress {
            turns: 0,
            output_tokens: 0,
            cause,
        };

        loop {
            if cancel.is_cancelled() {
                return Ok(self.interrupt(&progress));
            }
            if let Some(reason) = self.limit_reached(&progress) {
                return Ok(self.truncate(&progress, reason));
            }

            let unanswered: Vec<String> = self
                .conversation
                .unanswered_tool_calls()
                .into_iter()
                .map(|c| c.id.clone())
                .collect();
            if !unanswered.is_empty() {
                return Err(self.reject(&progress, AgentError::UnansweredToolCalls(unanswered)));
            }

            self.state = DriverState::Generating;
            debug!(turn = progress.turns + 1, "Requesting generation");
            let request = self.build_request();
            let generated = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                generated = self.provider.generate(request) => Some(generated),
            };
            let response = match generated {
                None => return Ok(self.interrupt(&progress)),
                Some(Err(e)) => return Err(self.reject(&progress, AgentError::Generation(e))),
                Some(Ok(response)) => response,
            };

            progress.turns += 1;
            progress.output_tokens += u64::from(response.output_tokens());

            let calls: Vec<ToolCall> = response.tool_calls().into_iter().cloned().collect();
            let call_events = self.publish_response(&response, &mut progress);
            let reply_text = response.text();
            self.conversation.push_assistant(response.blocks);

            if calls.is_empty() {
                let final_text = Some(reply_text).filter(|t| !t.trim().is_empty());
                return Ok(self.complete(&progress, final_text));
            }

            self.state = DriverState::DispatchingTools;
            let results = self.dispatcher.dispatch(&calls, &cancel).await;
            self.publish_results(&results, &call_events, &mut progress);

            let terminal_answer = results
                .iter()
                .find(|r| r.status == ToolStatus::Success && self.settings.is_terminal(&r.tool_name))
                .map(|r| r.output.render());
            self.conversation.push_tool_results(results);

            if cancel.is_cancelled() {
                info!(turns = progress.turns, "Agent interrupted during tool dispatch");
                self.state = DriverState::Interrupted;
                return Ok(self.outcome(RunStatus::Interrupted, None, &progress));
            }
            if let Some(answer) = terminal_answer {
                return Ok(self.complete(&progress, Some(answer)));
            }
        }
    }

    fn build_request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.conversation.groups().to_vec())
            .with_temperature(self.settings.temperature)
            .with_tools(self.dispatcher.registry().descriptors());
        if let Some(prompt) = &self.settings.system_prompt {
            request = request.with_system_prompt(prompt.clone());
        }
        if let Some(max_tokens) = self.settings.max_tokens_per_turn {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    fn limit_reached(&self, progress: &RunProgress) -> Option<String> {
        if progress.turns >= self.settings.max_turns {
            return Some(format!("reached the limit of {} turns", self.settings.max_turns));
        }
        match self.settings.max_output_tokens {
            Some(budget) if progress.output_tokens > budget => {
                Some(format!("used {} of {budget} output tokens", progress.output_tokens))
            }
            _ => None,
        }
    }

    /// Publish one event per meaningful block. Returns the event id of each tool call.
    fn publish_response(&self, response: &GenerationResponse, progress: &mut RunProgress) -> HashMap<String, EventId> {
        let mut call_events = HashMap::new();
        let trigger = progress.cause;
        for block in &response.blocks {
            let payload = match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => {
                    EventPayload::AgentMessage { text: text.clone() }
                }
                ContentBlock::Thinking { thinking, .. } if !thinking.trim().is_empty() => {
                    EventPayload::AgentThinking { text: thinking.clone() }
                }
                ContentBlock::ToolCall(call) => EventPayload::ToolCall { call: call.clone() },
                _ => continue,
            };
            let id = self.publish(Event::new(EventSource::Agent, payload), Some(trigger));
            if let ContentBlock::ToolCall(call) = block {
                call_events.insert(call.id.clone(), id);
            }
            progress.cause = id;
        }
        call_events
    }

    /// One event per result, in call order, each caused by its call's event.
    fn publish_results(
        &self,
        results: &[ToolResult],
        call_events: &HashMap<String, EventId>,
        progress: &mut RunProgress,
    ) {
        for result in results {
            let cause = call_events.get(&result.call_id).copied().unwrap_or(progress.cause);
            progress.cause = self.publish(
                Event::new(EventSource::Environment, EventPayload::ToolResult { result: result.clone() }),
                Some(cause),
            );
        }
    }

    fn complete(&mut self, progress: &RunProgress, final_text: Option<String>) -> RunOutcome {
        info!(turns = progress.turns, output_tokens = progress.output_tokens, "Agent run completed");
        self.publish(
            Event::new(
                EventSource::Agent,
                EventPayload::Completed {
                    final_text: final_text.clone(),
                    turns: progress.turns,
                },
            ),
            Some(progress.cause),
        );
        self.state = DriverState::Finished;
        self.outcome(RunStatus::Completed, final_text, progress)
    }

    fn truncate(&mut self, progress: &RunProgress, reason: String) -> RunOutcome {
        warn!(turns = progress.turns, reason = %reason, "Agent run truncated");
        self.conversation.push_assistant_text(TRUNCATION_MESSAGE);
        self.publish(
            Event::new(
                EventSource::Agent,
                EventPayload::Truncated {
                    reason,
                    turns: progress.turns,
                },
            ),
            Some(progress.cause),
        );
        self.state = DriverState::Finished;
        self.outcome(RunStatus::Truncated, None, progress)
    }

    fn interrupt(&mut self, progress: &RunProgress) -> RunOutcome {
        info!(turns = progress.turns, "Agent interrupted");
        self.conversation.push_assistant_text(AGENT_INTERRUPTED_MESSAGE);
        self.publish(
            Event::new(
                EventSource::Agent,
                EventPayload::AgentInterrupted {
                    message: AGENT_INTERRUPTED_MESSAGE.into(),
                },
            ),
            Some(progress.cause),
        );
        self.state = DriverState::Interrupted;
        self.outcome(RunStatus::Interrupted, None, progress)
    }

    fn reject(&mut self, progress: &RunProgress, error: AgentError) -> stride_core::Error {
        warn!(turns = progress.turns, error = %error, "Agent run failed");
        self.publish(
            Event::new(EventSource::Agent, EventPayload::Error { message: error.to_string() }),
            Some(progress.cause),
        );
        self.state = DriverState::Rejected;
        error.into()
    }

    fn outcome(&self, status: RunStatus, final_text: Option<String>, progress: &RunProgress) -> RunOutcome {
        RunOutcome {
            status,
            final_text,
            turns: progress.turns,
            output_tokens: progress.output_tokens,
        }
    }

    fn publish(&self, event: Event, cause: Option<EventId>) -> EventId {
        let event = match cause {
            Some(cause) => event.with_cause(cause),
            None => event,
        };
        self.bus.publish(event)
    }
}
