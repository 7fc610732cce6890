//! `RouteDecision` (spec §3) and the selection-strategy tag carried on it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStrategy {
    Champion,
    Challenger,
    Shadow,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RouteDecision {
    pub adapter_id: String,
    pub model_id: String,
    pub estimated_cost_micros: u64,
    pub estimated_latency_ms: f64,
    pub estimated_tokens_in: u64,
    pub estimated_tokens_out: u64,
    pub confidence: f64,
    pub strategy: DecisionStrategy,
    pub reasoning_tags: Vec<String>,
    /// Present when a challenger was also selected for shadow execution
    /// (spec §4.5 "Champion/challenger").
    pub challenger_adapter_id: Option<String>,
}
