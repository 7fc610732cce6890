//! The Dispatcher (spec §4.8): translates an admitted request into one or
//! two (champion + shadow challenger) adapter invocations and assembles the
//! resulting Observation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use atp_observability::{hash_prompt, Observation, ObservationSink, OBSERVATION_SCHEMA_VERSION};
use atp_protocol::AtpErrorCode;
use atp_registry::AdapterRegistry;
use atp_routing::RouteDecision;
use atp_session::Budget;
use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::errors::{Error, Result};
use crate::ports::{AdapterPort, DispatchContext, FragmentEvent};
use crate::quality::QualityPort;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Grace period within which an adapter stream must honor cancellation
    /// before the Dispatcher abandons it (spec §4.8 "Cancellation").
    pub cancellation_grace: Duration,
    /// Adapter deadline is `latency_slo_ms * deadline_multiplier` (spec §4.8:
    /// "deadline = SLO × 2").
    pub deadline_multiplier: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { cancellation_grace: Duration::from_millis(200), deadline_multiplier: 2.0 }
    }
}

/// Everything the Dispatcher needs to execute one admitted request.
pub struct DispatchRequest<'a> {
    pub request_id: String,
    pub session_id: String,
    pub tenant_id: String,
    pub qos: atp_protocol::QosTier,
    pub ttl: u32,
    pub latency_slo_ms: f64,
    pub prompt: &'a str,
    pub decision: RouteDecision,
    pub allow_failover: bool,
    pub cancellation: CancellationToken,
}

/// Outcome of a champion dispatch, used by the caller to build the terminal
/// frame or ERROR frame sent back over the session.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub adapter_id: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_micros: u64,
    pub success: bool,
    pub error_code: Option<AtpErrorCode>,
    pub fragments: Vec<FragmentEvent>,
    /// Carried into `Observation.quality_score` (spec §3/§6). Champion
    /// reports take this from the adapter's own `Done` event; shadow reports
    /// overwrite it with the external `QualityPort`'s score.
    pub quality_score: Option<f64>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Execute the champion adapter call (spec §4.8 steps a-h), with one
    /// failover attempt on failure if `allow_failover` and budget permits.
    /// Shadow execution of the challenger, if present, is started
    /// concurrently and does not affect the returned report.
    #[instrument(skip(self, adapters, registry, budget, sink, quality), fields(request_id = %request.request_id, session_id = %request.session_id, tenant_id = %request.tenant_id, qos = ?request.qos))]
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        request: DispatchRequest<'_>,
        adapters: &HashMap<String, Arc<dyn AdapterPort>>,
        registry: &AdapterRegistry,
        budget: &mut Budget,
        sink: &ObservationSink,
        quality: Option<&dyn QualityPort>,
    ) -> Result<DispatchReport> {
        if let Some(challenger_id) = request.decision.challenger_adapter_id.clone() {
            self.run_shadow(&request, &challenger_id, adapters, registry, quality, sink).await;
        }

        let primary = self
            .try_adapter(&request, &request.decision.adapter_id, adapters, registry, budget)
            .await;

        match primary {
            Ok(report) => {
                self.emit_observation(&request, &report, false, None, sink);
                Ok(report)
            }
            Err((err, partial)) => {
                if request.allow_failover {
                    if let Some(failover_id) = self.pick_failover(&request.decision, adapters) {
                        let retry = self.try_adapter(&request, &failover_id, adapters, registry, budget).await;
                        if let Ok(report) = retry {
                            self.emit_observation(&request, &report, false, None, sink);
                            return Ok(report);
                        }
                    }
                }
                self.emit_observation(&request, &partial, false, Some(&err), sink);
                Ok(partial)
            }
        }
    }

    async fn try_adapter(
        &self,
        request: &DispatchRequest<'_>,
        adapter_id: &str,
        adapters: &HashMap<String, Arc<dyn AdapterPort>>,
        registry: &AdapterRegistry,
        budget: &mut Budget,
    ) -> std::result::Result<DispatchReport, (Error, DispatchReport)> {
        let empty_report = |adapter_id: &str| DispatchReport {
            adapter_id: adapter_id.to_string(),
            tokens_in: 0,
            tokens_out: 0,
            cost_micros: 0,
            success: false,
            error_code: None,
            fragments: Vec::new(),
            quality_score: None,
        };

        if request.ttl == 0 {
            return Err((Error::TtlExhausted, empty_report(adapter_id)));
        }

        if !registry.allow_request(adapter_id, std::time::Instant::now()).unwrap_or(false) {
            return Err((Error::CircuitOpen { adapter_id: adapter_id.to_string() }, empty_report(adapter_id)));
        }

        let Some(adapter) = adapters.get(adapter_id) else {
            return Err((
                Error::AdapterFailed { adapter_id: adapter_id.to_string(), message: "not registered".into() },
                empty_report(adapter_id),
            ));
        };

        let estimate = adapter.estimate(request_tokens_in(request), 0).await;
        if !budget.reserve(request_tokens_in(request), estimate.estimated_cost_micros) {
            return Err((Error::BudgetExhausted { what: "tokens_or_usd" }, empty_report(adapter_id)));
        }

        let ctx = DispatchContext {
            request_id: request.request_id.clone(),
            session_id: request.session_id.clone(),
            tenant_id: request.tenant_id.clone(),
            model_id: request.decision.model_id.clone(),
            cancellation: request.cancellation.clone(),
        };

        let deadline = Duration::from_millis((request.latency_slo_ms * self.config.deadline_multiplier) as u64);
        let stream_future = adapter.stream(ctx, request_tokens_in(request));
        let outcome = tokio::time::timeout(deadline, self.drain_stream(stream_future)).await;

        match outcome {
            Ok(Ok((report, refund_tokens, refund_cost))) => {
                budget.release(refund_tokens, refund_cost);
                registry.record_success(adapter_id, std::time::Instant::now()).ok();
                Ok(report)
            }
            Ok(Err(message)) => {
                budget.release(0, 0);
                registry.record_failure(adapter_id, std::time::Instant::now()).ok();
                Err((Error::AdapterFailed { adapter_id: adapter_id.to_string(), message }, empty_report(adapter_id)))
            }
            Err(_elapsed) => {
                budget.release(0, 0);
                registry.record_failure(adapter_id, std::time::Instant::now()).ok();
                Err((Error::DeadlineExceeded, empty_report(adapter_id)))
            }
        }
    }

    async fn drain_stream(
        &self,
        stream: impl std::future::Future<Output = futures::stream::BoxStream<'static, FragmentEvent>>,
    ) -> std::result::Result<(DispatchReport, u64, u64), String> {
        let mut stream = stream.await;
        let mut fragments = Vec::new();
        let mut tokens_out = 0u64;
        let mut cost_micros = 0u64;
        let mut tokens_in = 0u64;
        let mut quality_score = None;

        while let Some(event) = stream.next().await {
            match &event {
                FragmentEvent::Token { tokens_out_delta, cost_delta_micros, .. } => {
                    tokens_out += tokens_out_delta;
                    cost_micros += cost_delta_micros;
                }
                FragmentEvent::Done { tokens_in: ti, tokens_out: to, cost_micros: c, quality_score: q } => {
                    tokens_in = *ti;
                    tokens_out = *to;
                    cost_micros = *c;
                    quality_score = *q;
                }
                FragmentEvent::Error { message } => {
                    fragments.push(event);
                    return Err(fragments
                        .iter()
                        .rev()
                        .find_map(|f| if let FragmentEvent::Error { message } = f { Some(message.clone()) } else { None })
                        .unwrap_or_else(|| message.clone()));
                }
            }
            fragments.push(event);
        }

        let report = DispatchReport {
            adapter_id: String::new(),
            tokens_in,
            tokens_out,
            cost_micros,
            success: true,
            error_code: None,
            fragments,
            quality_score,
        };
        Ok((report, tokens_in, 0))
    }

    fn pick_failover(
        &self,
        decision: &RouteDecision,
        adapters: &HashMap<String, Arc<dyn AdapterPort>>,
    ) -> Option<String> {
        decision
            .challenger_adapter_id
            .clone()
            .filter(|id| adapters.contains_key(id) && id != &decision.adapter_id)
    }

    /// Issue the challenger concurrently for shadow scoring (spec §4.8
    /// "Shadow execution"). Cancelled if it runs past its own sampling
    /// budget; its output never reaches the client.
    async fn run_shadow(
        &self,
        request: &DispatchRequest<'_>,
        challenger_id: &str,
        adapters: &HashMap<String, Arc<dyn AdapterPort>>,
        registry: &AdapterRegistry,
        quality: Option<&dyn QualityPort>,
        sink: &ObservationSink,
    ) {
        let Some(adapter) = adapters.get(challenger_id) else { return };
        if !registry.allow_request(challenger_id, std::time::Instant::now()).unwrap_or(false) {
            return;
        }

        let ctx = DispatchContext {
            request_id: request.request_id.clone(),
            session_id: request.session_id.clone(),
            tenant_id: request.tenant_id.clone(),
            model_id: request.decision.model_id.clone(),
            cancellation: CancellationToken::new(),
        };
        let deadline = Duration::from_millis((request.latency_slo_ms * self.config.deadline_multiplier) as u64);
        let stream = adapter.stream(ctx, request_tokens_in(request));
        let outcome = tokio::time::timeout(deadline, self.drain_stream(async { stream.await })).await;

        match outcome {
            Ok(Ok((mut report, ..))) => {
                registry.record_success(challenger_id, std::time::Instant::now()).ok();
                report.adapter_id = challenger_id.to_string();
                if let Some(quality) = quality {
                    let text: String = report
                        .fragments
                        .iter()
                        .filter_map(|f| if let FragmentEvent::Token { text, .. } = f { Some(text.clone()) } else { None })
                        .collect();
                    report.error_code = None;
                    report.quality_score = Some(quality.score(request_tokens_in(request), &text).await);
                }
                self.emit_observation(request, &report, true, None, sink);
            }
            Ok(Err(_)) | Err(_) => {
                registry.record_failure(challenger_id, std::time::Instant::now()).ok();
                warn!(adapter_id = challenger_id, "shadow execution failed or exceeded its sampling budget");
            }
        }
    }

    fn emit_observation(
        &self,
        request: &DispatchRequest<'_>,
        report: &DispatchReport,
        is_shadow: bool,
        error: Option<&Error>,
        sink: &ObservationSink,
    ) {
        let observation = Observation {
            request_id: request.request_id.clone(),
            tenant_id: request.tenant_id.clone(),
            adapter_id: if report.adapter_id.is_empty() { request.decision.adapter_id.clone() } else { report.adapter_id.clone() },
            model_id: request.decision.model_id.clone(),
            strategy: format!("{:?}", request.decision.strategy).to_lowercase(),
            estimated_cost_micros: request.decision.estimated_cost_micros,
            actual_cost_micros: report.cost_micros,
            estimated_latency_ms: request.decision.estimated_latency_ms,
            actual_latency_ms: request.latency_slo_ms,
            tokens_in: report.tokens_in,
            tokens_out: report.tokens_out,
            success: report.success && error.is_none(),
            error_code: error.map(|e| format!("{:?}", AtpErrorCode::from(e))),
            quality_score: report.quality_score,
            shadow_of: if is_shadow { Some(request.request_id.clone()) } else { None },
            redacted_prompt_hash: hash_prompt(request.prompt),
            schema_version: OBSERVATION_SCHEMA_VERSION,
        };
        sink.append(observation);
    }
}

fn request_tokens_in(request: &DispatchRequest<'_>) -> u64 {
    request.decision.estimated_tokens_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::AdapterEstimate;
    use async_trait::async_trait;
    use atp_observability::{AtpMetrics, SinkConfig};
    use atp_protocol::Window;
    use atp_registry::{AdapterCapability, BreakerConfig, HealthConfig, ReadinessConfig};
    use atp_routing::DecisionStrategy;
    use std::collections::BTreeSet;

    struct FakeAdapter {
        id: String,
        fragments: Vec<FragmentEvent>,
    }

    #[async_trait]
    impl AdapterPort for FakeAdapter {
        fn adapter_id(&self) -> &str {
            &self.id
        }

        async fn estimate(&self, _tokens_in: u64, _tokens_out: u64) -> AdapterEstimate {
            AdapterEstimate { estimated_cost_micros: 10, estimated_latency_ms: 100.0 }
        }

        async fn stream(&self, _ctx: DispatchContext, _prompt_tokens: u64) -> futures::stream::BoxStream<'static, FragmentEvent> {
            Box::pin(futures::stream::iter(self.fragments.clone()))
        }
    }

    fn registry_with_adapter(id: &str) -> AdapterRegistry {
        let registry = AdapterRegistry::new(HealthConfig::default(), BreakerConfig::default(), ReadinessConfig::default());
        let now = Utc::now();
        registry
            .register(
                AdapterCapability {
                    adapter_id: id.to_string(),
                    version: 1,
                    models: vec!["model-x".into()],
                    max_tokens: 8192,
                    supported_languages: BTreeSet::new(),
                    feature_bits: BTreeSet::new(),
                    cost_per_input_token_micros: 1.0,
                    cost_per_output_token_micros: 1.0,
                    cost_per_request_micros: 0.0,
                },
                now,
            )
            .unwrap();
        registry.observe_health(id, 50.0, 100.0, 150.0, 0.0, 10.0, 0, now).unwrap();
        registry
    }

    fn decision(adapter_id: &str) -> RouteDecision {
        RouteDecision {
            adapter_id: adapter_id.to_string(),
            model_id: "model-x".to_string(),
            estimated_cost_micros: 10,
            estimated_latency_ms: 100.0,
            estimated_tokens_in: 50,
            estimated_tokens_out: 0,
            confidence: 0.9,
            strategy: DecisionStrategy::Champion,
            reasoning_tags: vec![],
            challenger_adapter_id: None,
        }
    }

    #[tokio::test]
    async fn successful_dispatch_updates_breaker_and_budget() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let registry = registry_with_adapter("a");
        let mut adapters: HashMap<String, Arc<dyn AdapterPort>> = HashMap::new();
        adapters.insert(
            "a".to_string(),
            Arc::new(FakeAdapter {
                id: "a".to_string(),
                fragments: vec![FragmentEvent::Done { tokens_in: 50, tokens_out: 20, cost_micros: 15, quality_score: Some(0.8) }],
            }),
        );
        let mut budget = Budget::from_window(Window::new(4, 1000, 1000));
        let sink = ObservationSink::new(SinkConfig::default(), AtpMetrics::global());

        let request = DispatchRequest {
            request_id: "r1".to_string(),
            session_id: "s1".to_string(),
            tenant_id: "t1".to_string(),
            qos: atp_protocol::QosTier::Gold,
            ttl: 8,
            latency_slo_ms: 1000.0,
            prompt: "hello",
            decision: decision("a"),
            allow_failover: true,
            cancellation: CancellationToken::new(),
        };

        let report = dispatcher.dispatch(request, &adapters, &registry, &mut budget, &sink, None).await.unwrap();
        assert_eq!(report.tokens_out, 20);
        assert_eq!(report.quality_score, Some(0.8));
        assert_eq!(registry.breaker_state("a").unwrap(), atp_registry::BreakerState::Closed);

        let observations = sink.drain();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].quality_score, Some(0.8));
    }

    struct FakeQuality {
        score: f64,
    }

    #[async_trait]
    impl QualityPort for FakeQuality {
        async fn score(&self, _prompt_tokens: u64, _response_text: &str) -> f64 {
            self.score
        }
    }

    #[tokio::test]
    async fn shadow_execution_scores_the_challenger_and_emits_it() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let registry = registry_with_adapter("champion");
        registry
            .register(
                AdapterCapability {
                    adapter_id: "challenger".to_string(),
                    version: 1,
                    models: vec!["model-x".into()],
                    max_tokens: 8192,
                    supported_languages: BTreeSet::new(),
                    feature_bits: BTreeSet::new(),
                    cost_per_input_token_micros: 1.0,
                    cost_per_output_token_micros: 1.0,
                    cost_per_request_micros: 0.0,
                },
                Utc::now(),
            )
            .unwrap();
        registry.observe_health("challenger", 50.0, 100.0, 150.0, 0.0, 10.0, 0, Utc::now()).unwrap();

        let mut adapters: HashMap<String, Arc<dyn AdapterPort>> = HashMap::new();
        adapters.insert(
            "champion".to_string(),
            Arc::new(FakeAdapter {
                id: "champion".to_string(),
                fragments: vec![FragmentEvent::Done { tokens_in: 50, tokens_out: 20, cost_micros: 15, quality_score: None }],
            }),
        );
        adapters.insert(
            "challenger".to_string(),
            Arc::new(FakeAdapter {
                id: "challenger".to_string(),
                fragments: vec![
                    FragmentEvent::Token { text: "hi".to_string(), tokens_out_delta: 1, cost_delta_micros: 1 },
                    FragmentEvent::Done { tokens_in: 50, tokens_out: 1, cost_micros: 1, quality_score: None },
                ],
            }),
        );

        let mut budget = Budget::from_window(Window::new(4, 1000, 1000));
        let sink = ObservationSink::new(SinkConfig::default(), AtpMetrics::global());
        let quality = FakeQuality { score: 0.42 };

        let mut decision = decision("champion");
        decision.challenger_adapter_id = Some("challenger".to_string());

        let request = DispatchRequest {
            request_id: "r1".to_string(),
            session_id: "s1".to_string(),
            tenant_id: "t1".to_string(),
            qos: atp_protocol::QosTier::Gold,
            ttl: 8,
            latency_slo_ms: 1000.0,
            prompt: "hello",
            decision,
            allow_failover: true,
            cancellation: CancellationToken::new(),
        };

        dispatcher.dispatch(request, &adapters, &registry, &mut budget, &sink, Some(&quality)).await.unwrap();

        let observations = sink.drain();
        assert_eq!(observations.len(), 2);
        let shadow = observations.iter().find(|o| o.shadow_of.is_some()).expect("shadow observation emitted");
        assert_eq!(shadow.quality_score, Some(0.42));
    }

    #[tokio::test]
    async fn ttl_exhausted_is_rejected_before_touching_the_adapter() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let registry = registry_with_adapter("a");
        let adapters: HashMap<String, Arc<dyn AdapterPort>> = HashMap::new();
        let mut budget = Budget::from_window(Window::new(4, 1000, 1000));
        let sink = ObservationSink::new(SinkConfig::default(), AtpMetrics::global());

        let request = DispatchRequest {
            request_id: "r1".to_string(),
            session_id: "s1".to_string(),
            tenant_id: "t1".to_string(),
            qos: atp_protocol::QosTier::Gold,
            ttl: 0,
            latency_slo_ms: 1000.0,
            prompt: "hello",
            decision: decision("a"),
            allow_failover: false,
            cancellation: CancellationToken::new(),
        };

        let report = dispatcher.dispatch(request, &adapters, &registry, &mut budget, &sink, None).await.unwrap();
        assert!(!report.success);
    }
}
