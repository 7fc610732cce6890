//! Reward computation (spec §4.5 "Reward computation"), turning an
//! Observation's actuals into the scalar fed back into the bandit's
//! posterior update.

/// Piecewise latency reward: 1.0 at or below SLO, decaying linearly to 0.0
/// at 2×SLO (spec §4.5).
pub fn latency_reward(actual_latency_ms: f64, slo_ms: f64) -> f64 {
    if slo_ms <= 0.0 {
        return 0.0;
    }
    if actual_latency_ms <= slo_ms {
        1.0
    } else if actual_latency_ms >= 2.0 * slo_ms {
        0.0
    } else {
        1.0 - (actual_latency_ms - slo_ms) / slo_ms
    }
}

/// A per-error-code penalty subtracted from the reward. Spec §4.5 leaves
/// the exact magnitudes unstated beyond "penalty(error_code)"; this picks
/// a single flat penalty for any non-success outcome, since a Bernoulli arm
/// already receives a 0 reward on failure per the same paragraph — the
/// penalty only matters for the *non-Bernoulli* continuous score used in
/// observability/dashboards, not for the Beta posterior update itself.
pub fn error_penalty(error_code: Option<&str>) -> f64 {
    match error_code {
        None => 0.0,
        Some(_) => 0.25,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RewardWeights {
    pub quality: f64,
    pub latency: f64,
    pub cost: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self { quality: 0.5, latency: 0.3, cost: 0.2 }
    }
}

/// `reward = w_q·quality_score + w_l·latency_reward - w_c·cost_normalized -
/// penalty(error_code)`, clipped to `[0,1]` (spec §4.5). On failure the
/// Bernoulli arm gets a flat `0.0` regardless of the other inputs — the
/// weighted formula only applies to successful outcomes.
pub fn compute_reward(
    weights: RewardWeights,
    success: bool,
    quality_score: f64,
    actual_latency_ms: f64,
    slo_ms: f64,
    cost_normalized: f64,
    error_code: Option<&str>,
) -> f64 {
    if !success {
        return 0.0;
    }
    let raw = weights.quality * quality_score.clamp(0.0, 1.0)
        + weights.latency * latency_reward(actual_latency_ms, slo_ms)
        - weights.cost * cost_normalized.clamp(0.0, 1.0)
        - error_penalty(error_code);
    raw.clamp(0.0, 1.0)
}
