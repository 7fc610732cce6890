//! Bandit-based adapter selection (spec §4.5 "Selection policies").
//!
//! Each adapter's running statistics live in an [`ArmStats`] keyed by
//! `adapter_id`, owned by the [`BanditState`] table. Strategies read/update
//! this table; they never reach into the registry or routing request types
//! directly, so they stay unit-testable with synthetic win rates (spec §8's
//! "Bandit update" property).

pub mod greedy;
pub mod thompson;
pub mod ucb;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Thompson,
    Ucb,
    Greedy,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thompson" => Some(Strategy::Thompson),
            "ucb" => Some(Strategy::Ucb),
            "greedy" => Some(Strategy::Greedy),
            _ => None,
        }
    }
}

/// Per-adapter Beta(successes, failures) posterior plus a running mean
/// reward, shared by all three strategies (Thompson samples the Beta
/// directly; UCB and greedy use the mean/variance it implies).
#[derive(Debug, Clone, Copy)]
pub struct ArmStats {
    pub alpha: f64,
    pub beta: f64,
    pub pulls: u64,
    pub reward_sum: f64,
}

impl Default for ArmStats {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 1.0, pulls: 0, reward_sum: 0.0 }
    }
}

impl ArmStats {
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            0.5
        } else {
            self.reward_sum / self.pulls as f64
        }
    }

    /// Fold in a clipped-to-[0,1] reward observation (spec §4.5 "Reward
    /// computation"). The Beta posterior treats the reward as a Bernoulli
    /// trial weighted by its magnitude: `alpha += reward`, `beta += 1 -
    /// reward`, which degenerates to the textbook Bernoulli update when
    /// reward is exactly 0 or 1.
    pub fn update(&mut self, reward: f64) {
        let reward = reward.clamp(0.0, 1.0);
        self.alpha += reward;
        self.beta += 1.0 - reward;
        self.pulls += 1;
        self.reward_sum += reward;
    }
}

/// Shared, concurrency-safe table of per-adapter arm statistics. A single
/// `RwLock` over the map is enough here — updates are cheap float ops, not
/// I/O, so lock contention is not a concern the way it is for the
/// Observation buffer (spec §5 "single mutex with bounded critical
/// section").
#[derive(Default)]
pub struct BanditState {
    arms: RwLock<HashMap<String, ArmStats>>,
}

impl BanditState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, adapter_id: &str) -> ArmStats {
        self.arms.read().get(adapter_id).copied().unwrap_or_default()
    }

    pub fn record_reward(&self, adapter_id: &str, reward: f64) {
        self.arms.write().entry(adapter_id.to_string()).or_default().update(reward);
    }
}
