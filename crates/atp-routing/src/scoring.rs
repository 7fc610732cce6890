//! Weighted scoring among feasible adapters (spec §4.5 "Scoring").

use atp_registry::AdapterEntry;

use crate::constraints::estimate_cost_micros;
use crate::request::{RouteRequest, TenantPolicy};

/// Score components kept alongside the scalar total so tie-breaks (spec
/// §4.5 "Tie-breaks": lower staleness, higher freshness-weighted quality,
/// lower variance) have something to compare beyond the single number.
#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub quality: f64,
    pub latency: f64,
    pub cost: f64,
    pub carbon: f64,
    pub staleness_factor: f64,
}

/// Normalized inverse-cost / inverse-latency / predicted-quality /
/// optional-carbon weighted sum. `quality_posterior_mean` comes from the
/// bandit's current belief about the adapter, not from this module.
pub fn score(
    entry: &AdapterEntry,
    request: &RouteRequest,
    policy: &TenantPolicy,
    quality_posterior_mean: f64,
    carbon_intensity: f64,
) -> ScoreBreakdown {
    let cost = estimate_cost_micros(entry, request).max(1) as f64;
    let inverse_cost = (request.max_usd_micros.max(1) as f64 / cost).min(10.0) / 10.0;

    let latency = entry.p95_ms.max(1.0);
    let inverse_latency = (request.latency_slo_ms.max(1.0) / latency).min(2.0) / 2.0;
    let latency_component = inverse_latency * entry.staleness_factor;

    let inverse_carbon = (1.0 - carbon_intensity.clamp(0.0, 1.0)).max(0.0);

    let total = policy.weight_quality * quality_posterior_mean
        + policy.weight_latency * latency_component
        + policy.weight_cost * inverse_cost
        + policy.weight_carbon * inverse_carbon;

    ScoreBreakdown {
        total,
        quality: quality_posterior_mean,
        latency: latency_component,
        cost: inverse_cost,
        carbon: inverse_carbon,
        staleness_factor: entry.staleness_factor,
    }
}

/// Deterministic tie-break ordering (spec §4.5 "Tie-breaks"): prefer lower
/// staleness (i.e. higher staleness_factor), then higher quality, then
/// treat the rest as equal (variance tracking is left to the bandit's own
/// posterior width, not modeled as a separate field here).
pub fn break_tie(a: &ScoreBreakdown, b: &ScoreBreakdown) -> std::cmp::Ordering {
    b.staleness_factor
        .partial_cmp(&a.staleness_factor)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.quality.partial_cmp(&a.quality).unwrap_or(std::cmp::Ordering::Equal))
}
