//! Mixture-of-agents aggregation.
//!
//! One generation request is fanned out to every reference backend, the
//! successful answers are collected in registration order, and an
//! aggregator backend synthesizes the final response:
//!
//! ```text
//! FANOUT -> COLLECT -> AGGREGATE -> DONE
//!                          \-> FALLBACK (aggregator alone, original request)
//! ```
//!
//! With more than one layer, each layer's aggregated text is appended to the
//! conversation before the next fan-out. The result is returned exactly like
//! a single-backend generation; the per-layer report travels in the response
//! metadata under `"moa"`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use stride_config::MoaConfig;
use stride_core::error::ProviderError;
use stride_core::message::{ContentBlock, MessageGroup, last_user_text};
use stride_core::provider::{GenerationRequest, GenerationResponse, Provider, Usage};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::retry::{BackendHealth, ModelBackend};

/// Aggregation settings.
#[derive(Debug, Clone)]
pub struct MoaSettings {
    pub num_layers: u32,
    pub max_concurrent_requests: usize,
    pub fallback_to_single_model: bool,
    /// Must contain `{query}` and `{responses}`
    pub aggregation_prompt_template: String,
    pub aggregator_system_prompt: String,
}

impl MoaSettings {
    pub fn from_config(config: &MoaConfig) -> Self {
        Self {
            num_layers: config.num_layers.max(1),
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            fallback_to_single_model: config.fallback_to_single_model,
            aggregation_prompt_template: config.aggregation_prompt_template.clone(),
            aggregator_system_prompt: config.aggregator_system_prompt.clone(),
        }
    }
}

impl Default for MoaSettings {
    fn default() -> Self {
        Self::from_config(&MoaConfig::default())
    }
}

/// One reference backend's answer within a layer.
#[derive(Debug, Clone)]
pub struct LayerResponse {
    pub backend: String,
    pub blocks: Vec<ContentBlock>,
    pub usage: Option<Usage>,
    pub processing_time: Duration,
    pub error: Option<String>,
}

impl LayerResponse {
    fn from_result(
        backend: &str,
        result: Result<GenerationResponse, ProviderError>,
        processing_time: Duration,
    ) -> Self {
        match result {
            Ok(response) => Self {
                backend: backend.to_string(),
                blocks: response.blocks,
                usage: response.usage,
                processing_time,
                error: None,
            },
            Err(e) => Self {
                backend: backend.to_string(),
                blocks: Vec::new(),
                usage: None,
                processing_time,
                error: Some(e.to_string()),
            },
        }
    }

    /// No error and something to show.
    pub fn is_successful(&self) -> bool {
        self.error.is_none() && !self.rendered().trim().is_empty()
    }

    /// Text plus any proposed tool calls, as shown to the aggregator.
    pub fn rendered(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::ToolCall(call) => {
                    Some(format!("(proposes calling `{}` with {})", call.name, call.input))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseDetail {
    pub backend: String,
    pub success: bool,
    pub processing_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer_index: u32,
    pub num_responses: usize,
    pub success_rate: f64,
    pub processing_ms: u64,
    pub aggregated: bool,
    pub response_details: Vec<ResponseDetail>,
}

/// What happened during one aggregated generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoaReport {
    pub num_layers: usize,
    pub total_processing_ms: u64,
    pub layers: Vec<LayerReport>,
    pub total_reference_responses: usize,
    pub total_successful_responses: usize,
    pub overall_success_rate: f64,
    /// The answer came from the aggregator alone.
    pub fallback: bool,
}

impl MoaReport {
    fn push_layer(&mut self, index: u32, responses: &[LayerResponse], elapsed: Duration, aggregated: bool) {
        let successful = responses.iter().filter(|r| r.is_successful()).count();
        self.total_reference_responses += responses.len();
        self.total_successful_responses += successful;
        self.layers.push(LayerReport {
            layer_index: index,
            num_responses: responses.len(),
            success_rate: ratio(successful, responses.len()),
            processing_ms: millis(elapsed),
            aggregated,
            response_details: responses
                .iter()
                .map(|r| ResponseDetail {
                    backend: r.backend.clone(),
                    success: r.is_successful(),
                    processing_ms: millis(r.processing_time),
                    error: if r.is_successful() { None } else { r.error.clone().or(Some("empty response".into())) },
                })
                .collect(),
        });
        self.num_layers = self.layers.len();
    }

    fn finish(&mut self, elapsed: Duration) {
        self.total_processing_ms = millis(elapsed);
        self.overall_success_rate = ratio(self.total_successful_responses, self.total_reference_responses);
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

/// Why a layer could not produce an aggregated answer.
enum LayerFailure {
    NoReferences,
    Aggregator(ProviderError),
}

/// A [`Provider`] that answers by consulting several backends.
pub struct MixtureOfAgents {
    references: Vec<Arc<ModelBackend>>,
    aggregator: Arc<ModelBackend>,
    settings: MoaSettings,
}

impl MixtureOfAgents {
    /// References are consulted, and presented to the aggregator, in the
    /// order given.
    pub fn new(
        references: Vec<Arc<ModelBackend>>,
        aggregator: Arc<ModelBackend>,
        settings: MoaSettings,
    ) -> Result<Self, ProviderError> {
        if references.is_empty() {
            return Err(ProviderError::NotConfigured(
                "mixture of agents needs at least one reference backend".into(),
            ));
        }
        Ok(Self {
            references,
            aggregator,
            settings,
        })
    }

    pub fn reference_keys(&self) -> Vec<&str> {
        self.references.iter().map(|r| r.key()).collect()
    }

    pub fn aggregator_key(&self) -> &str {
        self.aggregator.key()
    }

    /// Counters for every backend involved, references first.
    pub fn health_report(&self) -> Vec<BackendHealth> {
        let mut report: Vec<BackendHealth> = self.references.iter().map(|r| r.health()).collect();
        if !self.references.iter().any(|r| Arc::ptr_eq(r, &self.aggregator)) {
            report.push(self.aggregator.health());
        }
        report
    }

    /// One response per reference, in registration order. A finished call
    /// frees its slot immediately, whatever the references ahead of it do.
    async fn fan_out(&self, request: &GenerationRequest) -> Vec<LayerResponse> {
        let references = self.references.iter().cloned().enumerate();
        let mut responses: Vec<(usize, LayerResponse)> = futures::stream::iter(references)
            .map(|(index, backend)| {
                let request = request.clone();
                async move {
                    let started = Instant::now();
                    let result = backend.generate(request).await;
                    (index, LayerResponse::from_result(backend.key(), result, started.elapsed()))
                }
            })
            .buffer_unordered(self.settings.max_concurrent_requests)
            .collect()
            .await;
        responses.sort_by_key(|(index, _)| *index);
        responses.into_iter().map(|(_, response)| response).collect()
    }

    /// The request the aggregator sees: the conversation so far plus one
    /// user message carrying the query and the successful answers.
    fn aggregation_request(&self, request: &GenerationRequest, responses: &[LayerResponse]) -> GenerationRequest {
        let query = last_user_text(&request.messages).unwrap_or_default();

        let answers = responses
            .iter()
            .filter(|r| r.is_successful())
            .enumerate()
            .map(|(i, r)| format!("[{}] {}:\n{}", i + 1, r.backend, r.rendered()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = render_template(&self.settings.aggregation_prompt_template, &query, &answers);

        let mut messages = request.messages.clone();
        messages.push(MessageGroup::user_text(prompt));

        let system_prompt = match &request.system_prompt {
            Some(original) => format!("{original}\n\n{}", self.settings.aggregator_system_prompt),
            None => self.settings.aggregator_system_prompt.clone(),
        };

        GenerationRequest {
            messages,
            system_prompt: Some(system_prompt),
            ..request.clone()
        }
    }

    /// Run every layer. On failure the report so far is handed back too.
    async fn run_layers(
        &self,
        request: &GenerationRequest,
        report: &mut MoaReport,
        usage: &mut Usage,
    ) -> Result<GenerationResponse, LayerFailure> {
        let mut current = request.clone();
        let mut last = None;

        for layer in 0..self.settings.num_layers {
            let started = Instant::now();
            info!(
                layer = layer + 1,
                layers = self.settings.num_layers,
                references = self.references.len(),
                "MoA layer started"
            );

            let responses = self.fan_out(&current).await;
            for response in &responses {
                if let Some(u) = &response.usage {
                    usage.add(u);
                }
            }

            let successful = responses.iter().filter(|r| r.is_successful()).count();
            if successful == 0 {
                report.push_layer(layer, &responses, started.elapsed(), false);
                warn!(layer = layer + 1, "No reference backend produced an answer");
                return Err(LayerFailure::NoReferences);
            }

            let aggregated = self.aggregator.generate(self.aggregation_request(&current, &responses)).await;
            report.push_layer(layer, &responses, started.elapsed(), aggregated.is_ok());
            let aggregated = aggregated.map_err(LayerFailure::Aggregator)?;
            if let Some(u) = &aggregated.usage {
                usage.add(u);
            }
            debug!(layer = layer + 1, successful, "MoA layer aggregated");

            let text = aggregated.text();
            if !text.trim().is_empty() {
                current.messages.push(MessageGroup::assistant_text(text));
            }
            last = Some(aggregated);
        }

        // num_layers >= 1, so at least one layer ran.
        last.ok_or(LayerFailure::NoReferences)
    }
}

#[async_trait]
impl Provider for MixtureOfAgents {
    fn name(&self) -> &str {
        "moa"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let started = Instant::now();
        let mut report = MoaReport::default();
        let mut usage = Usage::default();

        let outcome = self.run_layers(&request, &mut report, &mut usage).await;

        let mut response = match outcome {
            Ok(response) => response,
            Err(failure) => {
                let reason = match failure {
                    LayerFailure::NoReferences => "no reference backend succeeded".to_string(),
                    LayerFailure::Aggregator(e) => format!("aggregator failed: {e}"),
                };
                if !self.settings.fallback_to_single_model {
                    return Err(ProviderError::AggregationFailed(reason));
                }
                warn!(aggregator = %self.aggregator.key(), %reason, "MoA falling back to aggregator alone");
                report.fallback = true;
                let response = self
                    .aggregator
                    .generate(request)
                    .await
                    .map_err(|e| ProviderError::AggregationFailed(format!("{reason}; fallback failed: {e}")))?;
                if let Some(u) = &response.usage {
                    usage.add(u);
                }
                response
            }
        };

        report.finish(started.elapsed());
        info!(
            layers = report.num_layers,
            successful = report.total_successful_responses,
            references = report.total_reference_responses,
            fallback = report.fallback,
            elapsed_ms = report.total_processing_ms,
            "MoA generation completed"
        );

        response.usage = Some(usage);
        if let Ok(value) = serde_json::to_value(&report) {
            response.metadata.insert("moa".into(), value);
        }
        Ok(response)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.aggregator.health_check().await
    }
}

/// Substitute `{query}` and `{responses}` in one pass, so placeholder-like
/// text inside the substituted values is left alone.
fn render_template(template: &str, query: &str, responses: &str) -> String {
    let mut out = String::with_capacity(template.len() + query.len() + responses.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{query}") {
            out.push_str(query);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{responses}") {
            out.push_str(responses);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_support::*;

    fn backend(key: &str, provider: Arc<dyn Provider>) -> Arc<ModelBackend> {
        Arc::new(ModelBackend::new(key, provider).with_retry_policy(RetryPolicy::none()))
    }

    fn settings() -> MoaSettings {
        MoaSettings {
            aggregation_prompt_template: "Q: {query}\nA:\n{responses}".into(),
            aggregator_system_prompt: "Synthesize.".into(),
            ..MoaSettings::default()
        }
    }

    fn last_prompt(provider: &ReplyBackend) -> String {
        let request = provider.requests().pop().unwrap();
        request.messages.last().unwrap().text()
    }

    #[test]
    fn requires_a_reference() {
        let aggregator = backend("agg", Arc::new(ReplyBackend::new("agg", "x")));
        assert!(matches!(
            MixtureOfAgents::new(vec![], aggregator, settings()),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn failed_references_are_left_out_of_the_prompt() {
        let agg = Arc::new(ReplyBackend::new("agg", "final answer"));
        let moa = MixtureOfAgents::new(
            vec![
                backend("a", Arc::new(ReplyBackend::new("a", "answer from A"))),
                backend("b", Arc::new(ReplyBackend::new("b", "answer from B"))),
                backend("c", Arc::new(FlakyBackend::failing("c", ProviderError::Network("down".into())))),
            ],
            backend("agg", agg.clone()),
            settings(),
        )
        .unwrap();

        let response = moa.generate(request("what is 2+2?")).await.unwrap();
        assert_eq!(response.text(), "final answer");
        assert_eq!(agg.calls(), 1);

        let prompt = last_prompt(&agg);
        assert!(prompt.starts_with("Q: what is 2+2?"));
        assert!(prompt.contains("answer from A"));
        assert!(prompt.contains("answer from B"));
        assert!(!prompt.contains("[3]"));
        assert!(!prompt.contains("c:"));
        // Registration order
        assert!(prompt.find("answer from A").unwrap() < prompt.find("answer from B").unwrap());

        let report = &response.metadata["moa"];
        assert_eq!(report["total_reference_responses"], 3);
        assert_eq!(report["total_successful_responses"], 2);
        assert_eq!(report["fallback"], false);
        let details = report["layers"][0]["response_details"].as_array().unwrap();
        assert_eq!(details[2]["backend"], "c");
        assert_eq!(details[2]["success"], false);
        assert!(details[2]["error"].as_str().unwrap().contains("down"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reference_does_not_reorder_answers() {
        let agg = Arc::new(ReplyBackend::new("agg", "done"));
        let moa = MixtureOfAgents::new(
            vec![
                backend("slow", Arc::new(ReplyBackend::new("slow", "SLOW").with_delay(Duration::from_secs(5)))),
                backend("fast", Arc::new(ReplyBackend::new("fast", "FAST"))),
            ],
            backend("agg", agg.clone()),
            settings(),
        )
        .unwrap();

        moa.generate(request("q")).await.unwrap();
        let prompt = last_prompt(&agg);
        assert!(prompt.find("SLOW").unwrap() < prompt.find("FAST").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_respects_concurrency_bound() {
        let refs: Vec<_> = (0..4)
            .map(|i| {
                let key = format!("r{i}");
                let provider: Arc<dyn Provider> =
                    Arc::new(ReplyBackend::new(&key, "ok").with_delay(Duration::from_secs(1)));
                backend(&key, provider)
            })
            .collect();
        let moa = MixtureOfAgents::new(
            refs,
            backend("agg", Arc::new(ReplyBackend::new("agg", "done"))),
            MoaSettings { max_concurrent_requests: 2, ..settings() },
        )
        .unwrap();

        let started = Instant::now();
        moa.generate(request("q")).await.unwrap();
        // Four one-second calls, two at a time.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn aggregation_query_is_the_last_user_instruction() {
        use stride_core::message::Role;
        use stride_core::tool::{ToolCall, ToolOutput, ToolResult};

        let agg = Arc::new(ReplyBackend::new("agg", "done"));
        let moa = MixtureOfAgents::new(
            vec![backend("a", Arc::new(ReplyBackend::new("a", "answer from A")))],
            backend("agg", agg.clone()),
            settings(),
        )
        .unwrap();

        let call = ToolCall::new("c1", "list_dir", serde_json::json!({"path": "."}));
        let request = GenerationRequest::new(vec![
            MessageGroup::user_text("tidy the repo"),
            MessageGroup::new(Role::Assistant, vec![ContentBlock::ToolCall(call.clone())]),
            MessageGroup::new(
                Role::User,
                vec![ContentBlock::ToolResult(ToolResult::success(&call, ToolOutput::text("src/")))],
            ),
        ]);
        moa.generate(request).await.unwrap();

        assert!(last_prompt(&agg).starts_with("Q: tidy the repo\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_references_do_not_wait_behind_a_slow_one() {
        let fast_1 = Arc::new(ReplyBackend::new("f1", "F1").with_delay(Duration::from_secs(1)));
        let fast_2 = Arc::new(ReplyBackend::new("f2", "F2").with_delay(Duration::from_secs(1)));
        let agg = Arc::new(ReplyBackend::new("agg", "done"));
        let moa = MixtureOfAgents::new(
            vec![
                backend("slow", Arc::new(ReplyBackend::new("slow", "SLOW").with_delay(Duration::from_secs(5)))),
                backend("f1", fast_1.clone()),
                backend("f2", fast_2.clone()),
            ],
            backend("agg", agg.clone()),
            MoaSettings { max_concurrent_requests: 2, ..settings() },
        )
        .unwrap();

        let started = Instant::now();
        let handle = tokio::spawn(async move { moa.generate(request("q")).await });

        // f1 finishes at 1s and its slot goes to f2 straight away.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fast_2.calls(), 1);

        handle.await.unwrap().unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));

        let prompt = last_prompt(&agg);
        let order: Vec<_> = ["SLOW", "F1", "F2"].iter().map(|a| prompt.find(a).unwrap()).collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn all_references_failing_falls_back_to_aggregator() {
        let agg = Arc::new(ReplyBackend::new("agg", "plain answer"));
        let moa = MixtureOfAgents::new(
            vec![
                backend("a", Arc::new(FlakyBackend::failing("a", ProviderError::Network("x".into())))),
                backend("b", Arc::new(EmptyBackend)),
            ],
            backend("agg", agg.clone()),
            settings(),
        )
        .unwrap();

        let original = request("hello");
        let response = moa.generate(original.clone()).await.unwrap();

        let direct = agg.generate(original.clone()).await.unwrap();
        assert_eq!(response.blocks, direct.blocks);

        // The fallback call saw the untouched request.
        let seen = agg.requests();
        assert_eq!(seen[0].messages.len(), original.messages.len());
        assert_eq!(seen[0].system_prompt, original.system_prompt);

        let report = &response.metadata["moa"];
        assert_eq!(report["fallback"], true);
        assert_eq!(report["total_successful_responses"], 0);
        assert_eq!(report["layers"][0]["response_details"][1]["error"], "empty response");
    }

    #[tokio::test]
    async fn no_fallback_means_failure() {
        let moa = MixtureOfAgents::new(
            vec![backend("a", Arc::new(FlakyBackend::failing("a", ProviderError::Network("x".into()))))],
            backend("agg", Arc::new(ReplyBackend::new("agg", "unused"))),
            MoaSettings { fallback_to_single_model: false, ..settings() },
        )
        .unwrap();

        let err = moa.generate(request("hello")).await.unwrap_err();
        assert!(matches!(err, ProviderError::AggregationFailed(ref m) if m.contains("no reference")));
    }

    #[tokio::test]
    async fn aggregator_failure_falls_back_then_fails() {
        let agg = Arc::new(FlakyBackend::failing("agg", ProviderError::ModelNotFound("big".into())));
        let moa = MixtureOfAgents::new(
            vec![backend("a", Arc::new(ReplyBackend::new("a", "fine")))],
            backend("agg", agg.clone()),
            settings(),
        )
        .unwrap();

        let err = moa.generate(request("hello")).await.unwrap_err();
        match err {
            ProviderError::AggregationFailed(message) => {
                assert!(message.contains("aggregator failed"));
                assert!(message.contains("fallback failed"));
            }
            other => panic!("Expected AggregationFailed, got: {other:?}"),
        }
        // Aggregation attempt plus the fallback attempt.
        assert_eq!(agg.calls(), 2);
    }

    #[tokio::test]
    async fn layers_build_on_previous_aggregation() {
        let reference = Arc::new(ReplyBackend::new("a", "draft"));
        let agg = Arc::new(ReplyBackend::new("agg", "refined"));
        let moa = MixtureOfAgents::new(
            vec![backend("a", reference.clone())],
            backend("agg", agg.clone()),
            MoaSettings { num_layers: 2, ..settings() },
        )
        .unwrap();

        let response = moa.generate(request("improve this")).await.unwrap();
        assert_eq!(response.text(), "refined");
        assert_eq!(reference.calls(), 2);
        assert_eq!(agg.calls(), 2);

        // Second fan-out sees the first layer's aggregated answer.
        let second = &reference.requests()[1];
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[1].text(), "refined");

        let report = &response.metadata["moa"];
        assert_eq!(report["num_layers"], 2);
        assert_eq!(report["total_reference_responses"], 2);
    }

    #[tokio::test]
    async fn aggregator_gets_combined_system_prompt_and_usage_is_summed() {
        let agg = Arc::new(ReplyBackend::new("agg", "final"));
        let moa = MixtureOfAgents::new(
            vec![
                backend("a", Arc::new(ReplyBackend::new("a", "one"))),
                backend("b", Arc::new(ReplyBackend::new("b", "two"))),
            ],
            backend("agg", agg.clone()),
            settings(),
        )
        .unwrap();

        let response = moa
            .generate(request("q").with_system_prompt("You are an agent."))
            .await
            .unwrap();

        let system = agg.requests()[0].system_prompt.clone().unwrap();
        assert!(system.starts_with("You are an agent."));
        assert!(system.ends_with("Synthesize."));
        // Three calls at 5 completion tokens each.
        assert_eq!(response.usage.unwrap().completion_tokens, 15);
    }

    #[tokio::test]
    async fn health_report_covers_every_backend() {
        let shared = backend("a", Arc::new(ReplyBackend::new("a", "x")));
        let moa = MixtureOfAgents::new(
            vec![shared.clone(), backend("b", Arc::new(FlakyBackend::failing("b", ProviderError::Network("n".into()))))],
            shared,
            settings(),
        )
        .unwrap();

        moa.generate(request("q")).await.unwrap();
        let health = moa.health_report();
        assert_eq!(health.len(), 2);
        assert_eq!(health[0].backend, "a");
        assert_eq!(health[0].successes, 2);
        assert_eq!(health[1].failures, 1);
        assert_eq!(moa.reference_keys(), vec!["a", "b"]);
        assert_eq!(moa.aggregator_key(), "a");
    }

    #[test]
    fn template_substitution_is_single_pass() {
        let rendered = render_template("{query} | {responses} | {other}", "about {responses}", "R");
        assert_eq!(rendered, "about {responses} | R | {other}");
    }

    #[test]
    fn tool_call_answers_count_as_content() {
        let response = LayerResponse {
            backend: "a".into(),
            blocks: vec![ContentBlock::ToolCall(stride_core::tool::ToolCall::new(
                "c1",
                "file_read",
                serde_json::json!({"path": "x"}),
            ))],
            usage: None,
            processing_time: Duration::ZERO,
            error: None,
        };
        assert!(response.is_successful());
        assert!(response.rendered().contains("file_read"));
    }
}
