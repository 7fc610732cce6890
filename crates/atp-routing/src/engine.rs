//! The Routing Engine (spec §4.5): ties the constraint filter, scoring,
//! bandit selection, and champion/challenger shadowing together into one
//! `route` call.

use atp_registry::AdapterRegistry;
use chrono::Utc;
use rand::Rng;

use crate::bandit::{greedy, thompson, ucb, ArmStats, BanditState, Strategy};
use crate::constraints::{estimate_cost_micros, passes_constraints};
use crate::decision::{DecisionStrategy, RouteDecision};
use crate::errors::{Error, Result};
use crate::request::{RouteRequest, TenantPolicy};
use crate::scoring::{self, ScoreBreakdown};

pub struct RoutingEngine {
    bandit: BanditState,
    ucb_c: f64,
    greedy_epsilon: f64,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self { bandit: BanditState::new(), ucb_c: 2.0, greedy_epsilon: 0.1 }
    }
}

impl RoutingEngine {
    pub fn new(ucb_c: f64, greedy_epsilon: f64) -> Self {
        Self { bandit: BanditState::new(), ucb_c, greedy_epsilon }
    }

    pub fn bandit(&self) -> &BanditState {
        &self.bandit
    }

    /// Select a champion (and, with probability `policy.shadow_probability`,
    /// a challenger) for `request` from `registry`'s currently registered
    /// adapters (spec §4.5 "Output").
    pub fn route<R: Rng + ?Sized>(
        &self,
        request: &RouteRequest,
        registry: &AdapterRegistry,
        policy: &TenantPolicy,
        rng: &mut R,
    ) -> Result<RouteDecision> {
        let now = Utc::now();
        let snapshot = registry.list_compatible(&request.capability_request(), now);

        let feasible: Vec<_> = snapshot
            .entries
            .into_iter()
            .filter(|entry| passes_constraints(entry, request, policy).is_ok())
            .collect();

        if feasible.is_empty() {
            return Err(Error::NoFeasibleAdapter { request_id: request.request_id.clone() });
        }

        let arm_stats: Vec<ArmStats> =
            feasible.iter().map(|e| self.bandit.snapshot(&e.capability.adapter_id)).collect();

        let champion_idx = match policy.strategy {
            Strategy::Thompson => thompson::select(&arm_stats, rng).unwrap_or(0),
            Strategy::Ucb => {
                let with_cost: Vec<_> = feasible
                    .iter()
                    .zip(arm_stats.iter())
                    .map(|(e, stats)| (*stats, estimate_cost_micros(e, request)))
                    .collect();
                ucb::select(&with_cost, self.ucb_c).unwrap_or(0)
            }
            Strategy::Greedy => greedy::select(&arm_stats, self.greedy_epsilon, rng).unwrap_or(0),
        };

        let champion = &feasible[champion_idx];
        let champion_score = self.score_one(champion, request, policy, &arm_stats[champion_idx]);

        let mut challenger_id = None;
        if feasible.len() > 1 && rng.gen_bool(policy.shadow_probability.clamp(0.0, 1.0)) {
            let mut best: Option<(usize, ScoreBreakdown)> = None;
            for (idx, entry) in feasible.iter().enumerate() {
                if idx == champion_idx {
                    continue;
                }
                let s = self.score_one(entry, request, policy, &arm_stats[idx]);
                let better = match &best {
                    None => true,
                    Some((_, current)) => s.total > current.total,
                };
                if better {
                    best = Some((idx, s));
                }
            }
            if let Some((idx, _)) = best {
                challenger_id = Some(feasible[idx].capability.adapter_id.clone());
            }
        }

        Ok(RouteDecision {
            adapter_id: champion.capability.adapter_id.clone(),
            model_id: champion.capability.models.first().cloned().unwrap_or_default(),
            estimated_cost_micros: estimate_cost_micros(champion, request),
            estimated_latency_ms: champion.p95_ms,
            estimated_tokens_in: request.estimated_tokens_in,
            estimated_tokens_out: request.estimated_tokens_out,
            confidence: champion_score.total.clamp(0.0, 1.0),
            strategy: DecisionStrategy::Champion,
            reasoning_tags: vec![format!("strategy:{:?}", policy.strategy)],
            challenger_adapter_id: challenger_id,
        })
    }

    fn score_one(
        &self,
        entry: &atp_registry::AdapterEntry,
        request: &RouteRequest,
        policy: &TenantPolicy,
        stats: &ArmStats,
    ) -> ScoreBreakdown {
        scoring::score(entry, request, policy, stats.mean_reward(), 0.0)
    }

    /// Feed an Observation's computed reward back into the bandit posterior
    /// for `adapter_id` (spec §4.5 "Reward computation").
    pub fn update(&self, adapter_id: &str, reward: f64) {
        self.bandit.record_reward(adapter_id, reward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_registry::{AdapterCapability, BreakerConfig, HealthConfig, ReadinessConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn registry_with_two_adapters() -> AdapterRegistry {
        let registry =
            AdapterRegistry::new(HealthConfig::default(), BreakerConfig::default(), ReadinessConfig::default());
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
                    cost_per_input_token_micros: 0.3,
                    cost_per_output_token_micros: 0.5,
                    cost_per_request_micros: 0.0,
                },
                now,
            )
            .unwrap();
        registry.observe_health("a", 200.0, 400.0, 500.0, 0.0, 10.0, 0, now).unwrap();

        registry
            .register(
                AdapterCapability {
                    adapter_id: "b".into(),
                    version: 1,
                    models: vec!["model-b".into()],
                    max_tokens: 8192,
                    supported_languages: BTreeSet::new(),
                    feature_bits: BTreeSet::new(),
                    cost_per_input_token_micros: 0.2,
                    cost_per_output_token_micros: 0.3,
                    cost_per_request_micros: 0.0,
                },
                now,
            )
            .unwrap();
        registry.observe_health("b", 300.0, 700.0, 800.0, 0.0, 10.0, 0, now).unwrap();

        registry
    }

    fn request() -> RouteRequest {
        RouteRequest {
            request_id: "r1".into(),
            tenant_id: "t1".into(),
            task_type: "qa".into(),
            required_languages: BTreeSet::new(),
            required_features: BTreeSet::new(),
            latency_slo_ms: 1000.0,
            max_usd_micros: 5_000,
            data_scope: BTreeSet::new(),
            estimated_tokens_in: 100,
            estimated_tokens_out: 200,
        }
    }

    #[test]
    fn routes_to_a_feasible_adapter() {
        let engine = RoutingEngine::default();
        let registry = registry_with_two_adapters();
        let mut rng = StdRng::seed_from_u64(1);
        let policy = TenantPolicy::default();
        let decision = engine.route(&request(), &registry, &policy, &mut rng).unwrap();
        assert!(decision.adapter_id == "a" || decision.adapter_id == "b");
        assert!(decision.estimated_cost_micros <= request().max_usd_micros);
    }

    #[test]
    fn errors_when_no_adapter_registered() {
        let engine = RoutingEngine::default();
        let registry =
            AdapterRegistry::new(HealthConfig::default(), BreakerConfig::default(), ReadinessConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let policy = TenantPolicy::default();
        let err = engine.route(&request(), &registry, &policy, &mut rng).unwrap_err();
        assert!(matches!(err, Error::NoFeasibleAdapter { .. }));
    }

    #[test]
    fn repeated_positive_reward_shifts_future_selection() {
        let engine = RoutingEngine::default();
        engine.update("a", 1.0);
        for _ in 0..50 {
            engine.update("a", 1.0);
            engine.update("b", 0.0);
        }
        let stats_a = engine.bandit().snapshot("a");
        let stats_b = engine.bandit().snapshot("b");
        assert!(stats_a.mean_reward() > stats_b.mean_reward());
    }
}
