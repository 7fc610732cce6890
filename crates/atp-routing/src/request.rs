//! The inbound shape the Routing Engine scores candidates against (spec
//! §4.5 "Inputs").

use std::collections::BTreeSet;

/// Per-tenant policy weights and constraints injected from the external
/// Policy port (spec §6). The engine never calls the port itself — the
/// caller resolves policy first and hands the result in here.
#[derive(Debug, Clone)]
pub struct TenantPolicy {
    pub allowed_adapters: Option<BTreeSet<String>>,
    pub allowed_data_scopes: BTreeSet<String>,
    pub weight_quality: f64,
    pub weight_latency: f64,
    pub weight_cost: f64,
    pub weight_carbon: f64,
    pub strategy: crate::bandit::Strategy,
    pub shadow_probability: f64,
}

impl Default for TenantPolicy {
    fn default() -> Self {
        Self {
            allowed_adapters: None,
            allowed_data_scopes: BTreeSet::new(),
            weight_quality: 0.4,
            weight_latency: 0.2,
            weight_cost: 0.3,
            weight_carbon: 0.1,
            strategy: crate::bandit::Strategy::Thompson,
            shadow_probability: 0.05,
        }
    }
}

/// One inbound request to route (spec §4.5 "Inputs").
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub request_id: String,
    pub tenant_id: String,
    pub task_type: String,
    pub required_languages: BTreeSet<String>,
    pub required_features: BTreeSet<String>,
    pub latency_slo_ms: f64,
    pub max_usd_micros: u64,
    pub data_scope: BTreeSet<String>,
    pub estimated_tokens_in: u64,
    pub estimated_tokens_out: u64,
}

impl RouteRequest {
    pub fn capability_request(&self) -> atp_registry::CapabilityRequest {
        atp_registry::CapabilityRequest {
            required_languages: self.required_languages.clone(),
            required_features: self.required_features.clone(),
            min_max_tokens: self.estimated_tokens_in + self.estimated_tokens_out,
        }
    }
}
