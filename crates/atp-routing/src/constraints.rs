//! Hard constraint filter (spec §4.5 "Constraint filter"), applied in order
//! before any scoring happens. A candidate that fails any gate is dropped,
//! never merely down-ranked.

use atp_registry::AdapterEntry;
use atp_registry::BreakerState;

use crate::request::{RouteRequest, TenantPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    FeatureMismatch,
    LatencySloInfeasible,
    CostCap,
    DataScope,
    TenantNotAllowed,
    BreakerOpen,
    HealthStale,
}

/// Per-output-token cost estimate used by the cost-cap gate. The spec
/// doesn't fix how tokens-in/out trade off against a request's
/// `max_usd_micros`; we charge the full estimated input+output split
/// against the adapter's advertised per-token rates, which is the same
/// shape `estimate()` on the Adapter port is expected to return (spec §6).
pub fn estimate_cost_micros(entry: &AdapterEntry, request: &RouteRequest) -> u64 {
    let input = entry.capability.cost_per_input_token_micros * request.estimated_tokens_in as f64;
    let output = entry.capability.cost_per_output_token_micros * request.estimated_tokens_out as f64;
    (input + output + entry.capability.cost_per_request_micros).max(0.0).round() as u64
}

/// Returns `Ok(())` when `entry` survives every hard gate, `Err(reason)`
/// for the first gate it fails.
pub fn passes_constraints(
    entry: &AdapterEntry,
    request: &RouteRequest,
    policy: &TenantPolicy,
) -> Result<(), RejectReason> {
    if !entry.ready {
        return Err(RejectReason::HealthStale);
    }
    if !request.required_languages.is_empty()
        && !request
            .required_languages
            .is_subset(&entry.capability.supported_languages)
    {
        return Err(RejectReason::FeatureMismatch);
    }
    if !request.required_features.is_subset(&entry.capability.feature_bits) {
        return Err(RejectReason::FeatureMismatch);
    }
    if entry.p95_ms > request.latency_slo_ms {
        return Err(RejectReason::LatencySloInfeasible);
    }
    if estimate_cost_micros(entry, request) > request.max_usd_micros {
        return Err(RejectReason::CostCap);
    }
    if !policy.allowed_data_scopes.is_empty() && !request.data_scope.is_subset(&policy.allowed_data_scopes) {
        return Err(RejectReason::DataScope);
    }
    if let Some(allowed) = &policy.allowed_adapters {
        if !allowed.contains(&entry.capability.adapter_id) {
            return Err(RejectReason::TenantNotAllowed);
        }
    }
    if matches!(entry.breaker_state, BreakerState::Open) {
        return Err(RejectReason::BreakerOpen);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn entry(p95: f64, breaker: BreakerState, ready: bool) -> AdapterEntry {
        AdapterEntry {
            capability: atp_registry::AdapterCapability {
                adapter_id: "a".into(),
                version: 1,
                models: vec!["m".into()],
                max_tokens: 8192,
                supported_languages: ["en"].iter().map(|s| s.to_string()).collect(),
                feature_bits: BTreeSet::new(),
                cost_per_input_token_micros: 0.1,
                cost_per_output_token_micros: 0.2,
                cost_per_request_micros: 0.0,
            },
            p50_ms: p95 / 2.0,
            p95_ms: p95,
            p99_ms: p95 * 1.2,
            error_rate: 0.0,
            staleness_factor: 1.0,
            breaker_state: breaker,
            ready,
        }
    }

    fn request() -> RouteRequest {
        RouteRequest {
            request_id: "r1".into(),
            tenant_id: "t1".into(),
            task_type: "qa".into(),
            required_languages: ["en"].iter().map(|s| s.to_string()).collect(),
            required_features: BTreeSet::new(),
            latency_slo_ms: 1000.0,
            max_usd_micros: 5000,
            data_scope: BTreeSet::new(),
            estimated_tokens_in: 100,
            estimated_tokens_out: 200,
        }
    }

    #[test]
    fn rejects_when_not_ready() {
        let e = entry(400.0, BreakerState::Closed, false);
        assert_eq!(
            passes_constraints(&e, &request(), &TenantPolicy::default()),
            Err(RejectReason::HealthStale)
        );
    }

    #[test]
    fn rejects_breaker_open() {
        let e = entry(400.0, BreakerState::Open, true);
        assert_eq!(
            passes_constraints(&e, &request(), &TenantPolicy::default()),
            Err(RejectReason::BreakerOpen)
        );
    }

    #[test]
    fn rejects_latency_slo_infeasible() {
        let e = entry(1500.0, BreakerState::Closed, true);
        assert_eq!(
            passes_constraints(&e, &request(), &TenantPolicy::default()),
            Err(RejectReason::LatencySloInfeasible)
        );
    }

    #[test]
    fn accepts_when_all_gates_pass() {
        let e = entry(400.0, BreakerState::Closed, true);
        assert!(passes_constraints(&e, &request(), &TenantPolicy::default()).is_ok());
    }

    #[test]
    fn rejects_tenant_not_allowed() {
        let e = entry(400.0, BreakerState::Closed, true);
        let mut policy = TenantPolicy::default();
        policy.allowed_adapters = Some(["other"].iter().map(|s| s.to_string()).collect());
        assert_eq!(
            passes_constraints(&e, &request(), &policy),
            Err(RejectReason::TenantNotAllowed)
        );
    }
}
