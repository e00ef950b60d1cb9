//! Generation backends for Stride.
//!
//! All backends implement the `stride_core::Provider` trait. Concrete
//! backends are wrapped in [`ModelBackend`] for retries and health tracking;
//! [`MixtureOfAgents`] combines several of them into one.

pub mod moa;
pub mod openai_compat;
pub mod retry;
pub mod router;

#[cfg(test)]
pub(crate) mod test_support;

pub use moa::{LayerResponse, MixtureOfAgents, MoaReport, MoaSettings};
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{BackendHealth, ModelBackend, RetryPolicy};
pub use router::{BackendRouter, GenerationStrategy, build_from_config, build_strategy};
