//! The minimal administrative HTTP surface (spec §6): health probes plus
//! `/v1/ask`, `/v1/plan`, `/v1/observe`. Grounded on
//! `dashflow-registry::api::server`'s axum router/state wiring, generalized
//! from a model registry's CRUD surface to this control plane's
//! routing/dispatch surface.
//!
//! This surface is deliberately separate from the ATP session/frame
//! protocol in `atp-session`: it is a plain request/response (or SSE)
//! façade for callers that don't want to speak the framed wire protocol,
//! matching spec §6's "Administrative HTTP surface (minimal)". Each call
//! here builds a throwaway session-less [`Budget`] from the request's own
//! triplet window rather than reusing a live ATP session's budget, since
//! this surface has no handshake of its own (see `DESIGN.md` open
//! questions).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use atp_dispatcher::{AdapterPort, DispatchRequest, Dispatcher, DispatcherConfig, QualityPort};
use atp_observability::{hash_prompt, Observation, ObservationPort, ObservationSink, OBSERVATION_SCHEMA_VERSION};
use atp_protocol::{QosTier, Window};
use atp_registry::AdapterRegistry;
use atp_routing::{RouteRequest, RoutingEngine, TenantPolicy};
use atp_scheduler::{AimdConfig, CongestionSignal, FairScheduler, FlowControllerRegistry, QueuedRequest};
use atp_session::Budget;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::lifecycle::HealthProbes;

/// Shared state every admin handler closes over. Each mutable collaborator
/// is guarded independently (spec §5 "Shared resources and locks") rather
/// than behind one coarse lock, so a registry read never blocks a scheduler
/// admission decision.
pub struct AppState {
    pub probes: HealthProbes,
    pub registry: Arc<AdapterRegistry>,
    pub routing: Arc<RoutingEngine>,
    pub scheduler: Arc<Mutex<FairScheduler>>,
    pub flow: Arc<Mutex<FlowControllerRegistry>>,
    pub dispatcher: Arc<Dispatcher>,
    pub adapters: Arc<HashMap<String, Arc<dyn AdapterPort>>>,
    pub quality: Option<Arc<dyn QualityPort>>,
    pub observation_sink: Arc<ObservationSink>,
    pub observation_port: Option<Arc<dyn ObservationPort>>,
    pub default_policy: TenantPolicy,
}

impl AppState {
    pub fn new(
        probes: HealthProbes,
        registry: Arc<AdapterRegistry>,
        routing: Arc<RoutingEngine>,
        scheduler: Arc<Mutex<FairScheduler>>,
        observation_sink: Arc<ObservationSink>,
    ) -> Self {
        Self {
            probes,
            registry,
            routing,
            scheduler,
            flow: Arc::new(Mutex::new(FlowControllerRegistry::new(AimdConfig::default()))),
            dispatcher: Arc::new(Dispatcher::new(DispatcherConfig::default())),
            adapters: Arc::new(HashMap::new()),
            quality: None,
            observation_sink,
            observation_port: None,
            default_policy: TenantPolicy::default(),
        }
    }

    pub fn with_adapters(mut self, adapters: HashMap<String, Arc<dyn AdapterPort>>) -> Self {
        self.adapters = Arc::new(adapters);
        self
    }

    pub fn with_observation_port(mut self, port: Arc<dyn ObservationPort>) -> Self {
        self.observation_port = Some(port);
        self
    }
}

/// Build the admin router (spec §6: `/healthz`, `/livez`, `/readyz`,
/// `/startupz`, `/v1/ask`, `/v1/plan`, `/v1/observe`).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/startupz", get(startupz))
        .route("/v1/ask", post(ask))
        .route("/v1/plan", post(plan))
        .route("/v1/observe", post(observe))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.probes.is_live() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ok")
    }
}

async fn livez(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.probes.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.probes.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn startupz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.probes.is_started() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Request body shared by `/v1/ask` and `/v1/plan` — everything
/// `RouteRequest` (spec §4.5 "Inputs") needs, plus QoS and a window for
/// admission.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub request_id: String,
    pub session_id: String,
    pub tenant_id: String,
    pub task_type: String,
    #[serde(default)]
    pub qos: AskQosTier,
    #[serde(default)]
    pub required_languages: BTreeSet<String>,
    #[serde(default)]
    pub required_features: BTreeSet<String>,
    pub latency_slo_ms: f64,
    pub max_usd_micros: u64,
    #[serde(default)]
    pub data_scope: BTreeSet<String>,
    pub estimated_tokens_in: u64,
    pub estimated_tokens_out: u64,
    pub prompt: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

const fn default_ttl() -> u32 {
    8
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AskQosTier {
    Bronze,
    Silver,
    #[default]
    Gold,
}

impl From<AskQosTier> for QosTier {
    fn from(value: AskQosTier) -> Self {
        match value {
            AskQosTier::Bronze => QosTier::Bronze,
            AskQosTier::Silver => QosTier::Silver,
            AskQosTier::Gold => QosTier::Gold,
        }
    }
}

impl AskRequest {
    fn route_request(&self) -> RouteRequest {
        RouteRequest {
            request_id: self.request_id.clone(),
            tenant_id: self.tenant_id.clone(),
            task_type: self.task_type.clone(),
            required_languages: self.required_languages.clone(),
            required_features: self.required_features.clone(),
            latency_slo_ms: self.latency_slo_ms,
            max_usd_micros: self.max_usd_micros,
            data_scope: self.data_scope.clone(),
            estimated_tokens_in: self.estimated_tokens_in,
            estimated_tokens_out: self.estimated_tokens_out,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiError {
    code: String,
    message: String,
}

fn api_error(code: &str, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    let status = match code {
        "EADAPTER" => StatusCode::SERVICE_UNAVAILABLE,
        "EBUSY" | "ECIRCUIT" => StatusCode::TOO_MANY_REQUESTS,
        "EWINDOW" => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError { code: code.to_string(), message: message.into() }))
}

/// `POST /v1/plan`: produce a `RouteDecision` without executing it (spec
/// §6). Runs the constraint filter and bandit selection but never touches
/// the scheduler or an adapter.
#[instrument(skip(state, body), fields(request_id = %body.request_id, tenant_id = %body.tenant_id))]
async fn plan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> impl IntoResponse {
    let mut rng = rand::thread_rng();
    match state.routing.route(&body.route_request(), &state.registry, &state.default_policy, &mut rng) {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(err) => {
            let code = atp_protocol::AtpErrorCode::from(&err);
            api_error(&format!("{code:?}").to_uppercase(), err.to_string()).into_response()
        }
    }
}

/// `POST /v1/ask`: plan, admit, and dispatch a request, streaming the
/// result back as server-sent events (spec §6 "Streaming responses use
/// chunked transfer or server-sent events").
#[instrument(skip(state, body), fields(request_id = %body.request_id, tenant_id = %body.tenant_id))]
async fn ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> axum::response::Response {
    let route_request = body.route_request();
    let mut rng = rand::thread_rng();
    let decision = match state.routing.route(&route_request, &state.registry, &state.default_policy, &mut rng) {
        Ok(decision) => decision,
        Err(err) => {
            let code = atp_protocol::AtpErrorCode::from(&err);
            return api_error(&format!("{code:?}").to_uppercase(), err.to_string()).into_response();
        }
    };

    let window =
        Window::new(1, body.estimated_tokens_in + body.estimated_tokens_out, decision.estimated_cost_micros.max(body.max_usd_micros));
    let mut budget = Budget::from_window(window);

    // AIMD-controlled concurrency ceiling on top of the scheduler's static
    // per-tenant cap (spec §4.7): a tenant whose outstanding requests have
    // already hit its current window backs off as BUSY/congestion, the same
    // signal a real Frame-level BUSY status would raise.
    let flow_max_parallel = state.flow.lock().current_window(&body.tenant_id).max_parallel;
    if state.scheduler.lock().in_flight(&body.tenant_id) >= flow_max_parallel {
        state.flow.lock().record_congestion(&body.tenant_id, CongestionSignal::Busy, std::time::Instant::now());
        return api_error("EBUSY", "tenant has reached its AIMD-controlled outstanding-request window").into_response();
    }

    let admitted = {
        let mut scheduler = state.scheduler.lock();
        if let Err(err) = scheduler.enqueue(QueuedRequest {
            request_id: body.request_id.clone(),
            session_id: body.session_id.clone(),
            tenant_id: body.tenant_id.clone(),
            qos: body.qos.into(),
            estimated_tokens: body.estimated_tokens_in + body.estimated_tokens_out,
            estimated_usd_micros: decision.estimated_cost_micros,
            enqueued_at: std::time::Instant::now(),
        }) {
            state.flow.lock().record_congestion(&body.tenant_id, CongestionSignal::Busy, std::time::Instant::now());
            let code = atp_protocol::AtpErrorCode::from(&err);
            return api_error(&format!("{code:?}").to_uppercase(), err.to_string()).into_response();
        }

        // Dequeue through the fair scheduler's weighted DRR (spec §4.6)
        // rather than admitting the just-enqueued item directly, so it
        // never sits orphaned in its tenant's queue and gold requests
        // actually reach the preemption path below.
        let Some(popped) = scheduler.drr_pop(&body.tenant_id) else {
            return api_error("EINTERNAL", "scheduler dropped the request it had just enqueued").into_response();
        };
        scheduler.record_wait(&popped.tenant_id, popped.enqueued_at.elapsed());
        scheduler.admit(&popped.tenant_id, popped.qos, &mut budget, popped.estimated_tokens, popped.estimated_usd_micros)
    };

    match admitted {
        Ok(atp_scheduler::AdmitOutcome::Admitted) => {}
        Ok(atp_scheduler::AdmitOutcome::AdmittedWithPreemption { preempted_request_id }) => {
            tracing::warn!(preempted_request_id, tenant_id = %body.tenant_id, "gold request preempted a lower-QoS in-flight request");
        }
        Err(err) => {
            // Concurrency/queue saturation is exactly the BUSY backpressure
            // signal the Flow Controller's AIMD decrease reacts to (spec
            // §4.7); a pure budget/window rejection is not congestion.
            if !matches!(err, atp_scheduler::Error::WindowExceeded { .. }) {
                state.flow.lock().record_congestion(&body.tenant_id, CongestionSignal::Busy, std::time::Instant::now());
            }
            let code = atp_protocol::AtpErrorCode::from(&err);
            return api_error(&format!("{code:?}").to_uppercase(), err.to_string()).into_response();
        }
    }

    let dispatch_request = DispatchRequest {
        request_id: body.request_id.clone(),
        session_id: body.session_id.clone(),
        tenant_id: body.tenant_id.clone(),
        qos: body.qos.into(),
        ttl: body.ttl,
        latency_slo_ms: body.latency_slo_ms,
        prompt: &body.prompt,
        decision,
        allow_failover: true,
        cancellation: CancellationToken::new(),
    };

    let report = state
        .dispatcher
        .dispatch(
            dispatch_request,
            &state.adapters,
            &state.registry,
            &mut budget,
            &state.observation_sink,
            state.quality.as_deref(),
        )
        .await;

    state.scheduler.lock().release_admission(&body.tenant_id);

    match report {
        Ok(report) => {
            let now = std::time::Instant::now();
            {
                let mut flow = state.flow.lock();
                if report.success {
                    flow.record_success(&body.tenant_id);
                } else if report.error_code == Some(atp_protocol::AtpErrorCode::ETimeout) {
                    flow.record_congestion(&body.tenant_id, CongestionSignal::LatencyOverSlo, now);
                } else {
                    flow.record_congestion(&body.tenant_id, CongestionSignal::Ecn, now);
                }
            }
            let window_update = state.flow.lock().window_update_due(&body.tenant_id, now);

            let terminal = Event::default().event("terminal").json_data(serde_json::json!({
                "adapter_id": report.adapter_id,
                "tokens_in": report.tokens_in,
                "tokens_out": report.tokens_out,
                "cost_micros": report.cost_micros,
                "success": report.success,
                "error_code": report.error_code,
                "window_update": window_update,
            })).unwrap_or_default();
            let events = report
                .fragments
                .iter()
                .map(fragment_to_event)
                .map(Ok::<_, std::convert::Infallible>)
                .collect::<Vec<_>>()
                .into_iter()
                .chain(std::iter::once(Ok(terminal)));
            let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>> =
                Box::pin(stream::iter(events));
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(err) => {
            let code = atp_protocol::AtpErrorCode::from(&err);
            api_error(&format!("{code:?}").to_uppercase(), err.to_string()).into_response()
        }
    }
}

fn fragment_to_event(fragment: &atp_dispatcher::FragmentEvent) -> Event {
    match fragment {
        atp_dispatcher::FragmentEvent::Token { text, tokens_out_delta, cost_delta_micros } => Event::default()
            .event("token")
            .json_data(serde_json::json!({
                "text": text,
                "tokens_out_delta": tokens_out_delta,
                "cost_delta_micros": cost_delta_micros,
            }))
            .unwrap_or_default(),
        atp_dispatcher::FragmentEvent::Done { tokens_in, tokens_out, cost_micros, quality_score } => Event::default()
            .event("done")
            .json_data(serde_json::json!({
                "tokens_in": tokens_in,
                "tokens_out": tokens_out,
                "cost_micros": cost_micros,
                "quality_score": quality_score,
            }))
            .unwrap_or_default(),
        atp_dispatcher::FragmentEvent::Error { message } => {
            Event::default().event("error").json_data(serde_json::json!({ "message": message })).unwrap_or_default()
        }
    }
}

/// `POST /v1/observe`: external feedback (spec §6), appended to the
/// Observation sink and folded into the bandit posterior the same way the
/// Dispatcher's own observations are.
#[derive(Debug, Deserialize)]
struct ObserveRequest {
    request_id: String,
    tenant_id: String,
    adapter_id: String,
    model_id: String,
    #[serde(default)]
    strategy: String,
    estimated_cost_micros: u64,
    actual_cost_micros: u64,
    estimated_latency_ms: f64,
    actual_latency_ms: f64,
    tokens_in: u64,
    tokens_out: u64,
    success: bool,
    error_code: Option<String>,
    quality_score: Option<f64>,
    shadow_of: Option<String>,
    prompt: Option<String>,
}

#[instrument(skip(state, body), fields(request_id = %body.request_id, adapter_id = %body.adapter_id))]
async fn observe(State(state): State<Arc<AppState>>, Json(body): Json<ObserveRequest>) -> impl IntoResponse {
    let observation = Observation {
        request_id: body.request_id,
        tenant_id: body.tenant_id,
        adapter_id: body.adapter_id.clone(),
        model_id: body.model_id,
        strategy: if body.strategy.is_empty() { "external".to_string() } else { body.strategy },
        estimated_cost_micros: body.estimated_cost_micros,
        actual_cost_micros: body.actual_cost_micros,
        estimated_latency_ms: body.estimated_latency_ms,
        actual_latency_ms: body.actual_latency_ms,
        tokens_in: body.tokens_in,
        tokens_out: body.tokens_out,
        success: body.success,
        error_code: body.error_code.clone(),
        quality_score: body.quality_score,
        shadow_of: body.shadow_of,
        redacted_prompt_hash: body.prompt.as_deref().map(hash_prompt).unwrap_or_default(),
        schema_version: OBSERVATION_SCHEMA_VERSION,
    };

    let reward = atp_routing::reward::compute_reward(
        atp_routing::reward::RewardWeights::default(),
        observation.success,
        observation.quality_score.unwrap_or(0.0),
        observation.actual_latency_ms,
        observation.estimated_latency_ms.max(1.0),
        0.0,
        observation.error_code.as_deref(),
    );
    state.routing.update(&body.adapter_id, reward);

    if let Some(port) = state.observation_port.as_deref() {
        port.append(&observation);
    }
    state.observation_sink.append(observation);

    StatusCode::ACCEPTED
}

/// A no-op `AdapterPort`/`QualityPort` pair used by tests and by `atp-cli`
/// when no real provider adapters are configured, so the admin surface can
/// still answer `/v1/plan` and exercise the dispatch path end to end.
pub struct EchoAdapter {
    pub id: String,
}

#[async_trait]
impl AdapterPort for EchoAdapter {
    fn adapter_id(&self) -> &str {
        &self.id
    }

    async fn estimate(&self, tokens_in: u64, tokens_out: u64) -> atp_dispatcher::AdapterEstimate {
        atp_dispatcher::AdapterEstimate {
            estimated_cost_micros: tokens_in + tokens_out,
            estimated_latency_ms: 50.0,
        }
    }

    async fn stream(
        &self,
        _ctx: atp_dispatcher::DispatchContext,
        prompt_tokens: u64,
    ) -> futures::stream::BoxStream<'static, atp_dispatcher::FragmentEvent> {
        Box::pin(stream::iter(vec![atp_dispatcher::FragmentEvent::Done {
            tokens_in: prompt_tokens,
            tokens_out: 0,
            cost_micros: 0,
            quality_score: Some(0.5),
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_registry::{AdapterCapability, BreakerConfig, HealthConfig, ReadinessConfig};
    use atp_scheduler::SchedulerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let registry = Arc::new(AdapterRegistry::new(
            HealthConfig::default(),
            BreakerConfig::default(),
            ReadinessConfig::default(),
        ));
        let now = Utc::now();
        registry
            .register(
                AdapterCapability {
                    adapter_id: "a".into(),
                    version: 1,
                    models: vec!["model-a".into()],
                    max_tokens: 8192,
                    supported_languages: BTreeSet::new(),
                    feature_bits: BTreeSet::new(),
                    cost_per_input_token_micros: 0.1,
                    cost_per_output_token_micros: 0.1,
                    cost_per_request_micros: 0.0,
                },
                now,
            )
            .unwrap();
        registry.observe_health("a", 50.0, 100.0, 150.0, 0.0, 10.0, 0, now).unwrap();

        let sink = Arc::new(ObservationSink::new(
            atp_observability::SinkConfig::default(),
            atp_observability::AtpMetrics::global(),
        ));
        let mut adapters: HashMap<String, Arc<dyn AdapterPort>> = HashMap::new();
        adapters.insert("a".to_string(), Arc::new(EchoAdapter { id: "a".to_string() }));

        Arc::new(
            AppState::new(
                HealthProbes::new(),
                registry,
                Arc::new(RoutingEngine::default()),
                Arc::new(Mutex::new(FairScheduler::new(SchedulerConfig::default()))),
                sink,
            )
            .with_adapters(adapters),
        )
    }

    #[tokio::test]
    async fn healthz_reflects_liveness() {
        let state = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_is_not_ready_before_startup_completes() {
        let state = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn plan_returns_a_route_decision_for_a_feasible_request() {
        let state = test_state();
        let app = router(state);
        let body = serde_json::json!({
            "request_id": "r1",
            "session_id": "s1",
            "tenant_id": "t1",
            "task_type": "qa",
            "latency_slo_ms": 1000.0,
            "max_usd_micros": 5000,
            "estimated_tokens_in": 100,
            "estimated_tokens_out": 200,
            "prompt": "hello"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/plan")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ask_streams_a_terminal_event_on_success() {
        let state = test_state();
        let app = router(state);
        let body = serde_json::json!({
            "request_id": "r1",
            "session_id": "s1",
            "tenant_id": "t1",
            "task_type": "qa",
            "latency_slo_ms": 1000.0,
            "max_usd_micros": 5000,
            "estimated_tokens_in": 100,
            "estimated_tokens_out": 200,
            "prompt": "hello"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn a_successful_ask_grows_the_tenants_flow_window() {
        let state = test_state();
        let before = state.flow.lock().current_window("t1");
        let app = router(Arc::clone(&state));
        let body = serde_json::json!({
            "request_id": "r1",
            "session_id": "s1",
            "tenant_id": "t1",
            "task_type": "qa",
            "latency_slo_ms": 1000.0,
            "max_usd_micros": 5000,
            "estimated_tokens_in": 100,
            "estimated_tokens_out": 200,
            "prompt": "hello"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let after = state.flow.lock().current_window("t1");
        assert!(after.max_tokens > before.max_tokens, "a successful dispatch should widen the AIMD window");
        assert!(after.max_parallel > before.max_parallel);
    }

    #[tokio::test]
    async fn a_tenant_past_its_aimd_window_is_rejected_as_busy() {
        let state = test_state();
        state.flow.lock().record_congestion("t1", CongestionSignal::Ecn, std::time::Instant::now());
        state.flow.lock().record_congestion("t1", CongestionSignal::Ecn, std::time::Instant::now());
        state.flow.lock().record_congestion("t1", CongestionSignal::Ecn, std::time::Instant::now());
        // Three successive ECN-driven halvings from the default initial
        // window (max_parallel 4) floor out at max_parallel 1.
        assert_eq!(state.flow.lock().current_window("t1").max_parallel, 1);

        // Push the tenant's in-flight count to 1 so it's already at the
        // AIMD-shrunk ceiling before the request under test arrives.
        let mut warmup_budget = Budget::from_window(Window::new(10, 10_000, 10_000));
        {
            let mut scheduler = state.scheduler.lock();
            scheduler
                .enqueue(QueuedRequest {
                    request_id: "warmup".to_string(),
                    session_id: "s0".to_string(),
                    tenant_id: "t1".to_string(),
                    qos: QosTier::Bronze,
                    estimated_tokens: 10,
                    estimated_usd_micros: 10,
                    enqueued_at: std::time::Instant::now(),
                })
                .unwrap();
            let popped = scheduler.drr_pop("t1").unwrap();
            scheduler.record_wait(&popped.tenant_id, std::time::Duration::from_millis(0));
            scheduler
                .admit(&popped.tenant_id, popped.qos, &mut warmup_budget, popped.estimated_tokens, popped.estimated_usd_micros)
                .unwrap();
        }

        let app = router(Arc::clone(&state));
        let body = serde_json::json!({
            "request_id": "r1",
            "session_id": "s1",
            "tenant_id": "t1",
            "task_type": "qa",
            "latency_slo_ms": 1000.0,
            "max_usd_micros": 5000,
            "estimated_tokens_in": 100,
            "estimated_tokens_out": 200,
            "prompt": "hello"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
