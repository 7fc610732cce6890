//! The `Adapter` port (spec §6): the one external collaborator boundary the
//! Dispatcher calls through. Concrete LLM provider clients are out of scope
//! (spec §1) — this crate only defines the trait and drives it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// One event on an adapter's output stream (spec §4.8 "stream back
/// fragments").
#[derive(Debug, Clone)]
pub enum FragmentEvent {
    Token { text: String, tokens_out_delta: u64, cost_delta_micros: u64 },
    Done { tokens_in: u64, tokens_out: u64, cost_micros: u64, quality_score: Option<f64> },
    Error { message: String },
}

#[derive(Debug, Clone, Copy)]
pub struct AdapterEstimate {
    pub estimated_cost_micros: u64,
    pub estimated_latency_ms: f64,
}

/// Context an adapter invocation runs under: cancellation plus the request
/// metadata needed to build provider calls and spans.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub request_id: String,
    pub session_id: String,
    pub tenant_id: String,
    pub model_id: String,
    pub cancellation: CancellationToken,
}

/// One upstream model-provider adapter (spec §6 "Adapter port").
#[async_trait]
pub trait AdapterPort: Send + Sync {
    fn adapter_id(&self) -> &str;

    async fn estimate(&self, tokens_in: u64, tokens_out: u64) -> AdapterEstimate;

    /// Stream fragment events for one request. Implementations must honor
    /// `ctx.cancellation` within the Dispatcher's cancellation grace (spec
    /// §4.8 "Cancellation").
    async fn stream(&self, ctx: DispatchContext, prompt_tokens: u64) -> BoxStream<'static, FragmentEvent>;
}
