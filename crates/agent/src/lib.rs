//! The agent execution loop for Stride.
//!
//! The driver follows a **generate → dispatch → observe** cycle:
//!
//! 1. **Receive** an instruction and append it to the conversation
//! 2. **Generate** through the configured strategy (one backend or a
//!    mixture of agents)
//! 3. **If tool calls**: hand the batch to the [`ToolDispatcher`], append
//!    the results in call order, loop back to step 2
//! 4. **Otherwise** (or when a terminal tool succeeds) the run completes
//!
//! The loop also stops on the turn limit, the output-token budget or the
//! abort signal. Every step is published on the event bus, where the
//! stock [`subscribers`] log, persist or forward it.

pub mod dispatch;
pub mod driver;
pub mod subscribers;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatch::ToolDispatcher;
pub use driver::{
    AGENT_INTERRUPTED_MESSAGE, AgentDriver, DriverSettings, DriverState, RunOutcome, RunStatus,
    TRUNCATION_MESSAGE,
};
pub use subscribers::{JsonlPersistenceSubscriber, LiveConnectionSubscriber, TracingSubscriber};
