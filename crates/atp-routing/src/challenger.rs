//! Champion/challenger lifecycle (spec §4.5 "Champion/challenger", Open
//! Question resolved in §9: promotion/demotion uses the AND-conjunction of
//! win-rate, cost savings, and no safety regression).

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy)]
pub struct PromotionConfig {
    /// θ: challenger win-rate threshold.
    pub win_rate_threshold: f64,
    /// N_min: minimum trials before a promotion/demotion decision is made.
    pub min_trials: u64,
    /// s: minimum fractional cost savings the challenger must show.
    pub min_cost_savings: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self { win_rate_threshold: 0.55, min_trials: 100, min_cost_savings: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TrialTally {
    challenger_wins: u64,
    champion_wins: u64,
    challenger_cost_total: u64,
    champion_cost_total: u64,
    safety_regressions: u64,
}

impl TrialTally {
    fn trials(&self) -> u64 {
        self.challenger_wins + self.champion_wins
    }

    fn win_rate(&self) -> f64 {
        let trials = self.trials();
        if trials == 0 {
            return 0.0;
        }
        self.challenger_wins as f64 / trials as f64
    }

    fn cost_savings(&self) -> f64 {
        if self.champion_cost_total == 0 {
            return 0.0;
        }
        (self.champion_cost_total as f64 - self.challenger_cost_total as f64) / self.champion_cost_total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    KeepRunning,
    Promote,
    Demote,
}

/// Tracks shadow-run outcomes per (champion, challenger) pair and decides
/// when a challenger has earned promotion or should be abandoned.
#[derive(Default)]
pub struct ChallengerTracker {
    tallies: RwLock<HashMap<(String, String), TrialTally>>,
}

impl ChallengerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one shadow trial's outcome. `challenger_won` reflects the
    /// Quality port's head-to-head comparison; `safety_regression` flags
    /// any disqualifying safety signal, which forces demotion regardless of
    /// win-rate/cost once a decision is evaluated.
    pub fn record_trial(
        &self,
        champion: &str,
        challenger: &str,
        challenger_won: bool,
        champion_cost_micros: u64,
        challenger_cost_micros: u64,
        safety_regression: bool,
    ) {
        let mut tallies = self.tallies.write();
        let tally = tallies.entry((champion.to_string(), challenger.to_string())).or_default();
        if challenger_won {
            tally.challenger_wins += 1;
        } else {
            tally.champion_wins += 1;
        }
        tally.champion_cost_total += champion_cost_micros;
        tally.challenger_cost_total += challenger_cost_micros;
        if safety_regression {
            tally.safety_regressions += 1;
        }
    }

    /// Evaluate the AND-conjunction promotion rule (spec §9's resolved
    /// open question): win-rate ≥ θ AND cost savings ≥ s AND no safety
    /// regression, once at least `min_trials` trials have accumulated.
    /// Demotion is the mirror condition — win-rate below `1 - θ` symmetric
    /// threshold, or any safety regression at all.
    pub fn evaluate(&self, champion: &str, challenger: &str, config: PromotionConfig) -> Verdict {
        let tallies = self.tallies.read();
        let Some(tally) = tallies.get(&(champion.to_string(), challenger.to_string())) else {
            return Verdict::KeepRunning;
        };
        if tally.trials() < config.min_trials {
            return Verdict::KeepRunning;
        }
        if tally.safety_regressions > 0 {
            return Verdict::Demote;
        }
        if tally.win_rate() >= config.win_rate_threshold && tally.cost_savings() >= config.min_cost_savings {
            return Verdict::Promote;
        }
        if tally.win_rate() <= 1.0 - config.win_rate_threshold {
            return Verdict::Demote;
        }
        Verdict::KeepRunning
    }

    pub fn reset(&self, champion: &str, challenger: &str) {
        self.tallies.write().remove(&(champion.to_string(), challenger.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_after_min_trials_with_deterministic_rewards() {
        let tracker = ChallengerTracker::new();
        let config = PromotionConfig { win_rate_threshold: 0.6, min_trials: 10, min_cost_savings: 0.1 };
        for _ in 0..10 {
            tracker.record_trial("champ", "chal", true, 100, 80, false);
        }
        assert_eq!(tracker.evaluate("champ", "chal", config), Verdict::Promote);
    }

    #[test]
    fn keeps_running_before_min_trials_reached() {
        let tracker = ChallengerTracker::new();
        let config = PromotionConfig { win_rate_threshold: 0.6, min_trials: 100, min_cost_savings: 0.0 };
        for _ in 0..10 {
            tracker.record_trial("champ", "chal", true, 100, 80, false);
        }
        assert_eq!(tracker.evaluate("champ", "chal", config), Verdict::KeepRunning);
    }

    #[test]
    fn demotes_symmetrically_on_low_win_rate() {
        let tracker = ChallengerTracker::new();
        let config = PromotionConfig { win_rate_threshold: 0.6, min_trials: 10, min_cost_savings: 0.0 };
        for _ in 0..10 {
            tracker.record_trial("champ", "chal", false, 100, 80, false);
        }
        assert_eq!(tracker.evaluate("champ", "chal", config), Verdict::Demote);
    }

    #[test]
    fn safety_regression_forces_demotion_even_with_good_win_rate() {
        let tracker = ChallengerTracker::new();
        let config = PromotionConfig { win_rate_threshold: 0.5, min_trials: 5, min_cost_savings: 0.0 };
        for i in 0..10 {
            tracker.record_trial("champ", "chal", true, 100, 80, i == 0);
        }
        assert_eq!(tracker.evaluate("champ", "chal", config), Verdict::Demote);
    }

    #[test]
    fn insufficient_cost_savings_blocks_promotion_despite_win_rate() {
        let tracker = ChallengerTracker::new();
        let config = PromotionConfig { win_rate_threshold: 0.5, min_trials: 10, min_cost_savings: 0.5 };
        for _ in 0..10 {
            tracker.record_trial("champ", "chal", true, 100, 95, false);
        }
        assert_eq!(tracker.evaluate("champ", "chal", config), Verdict::KeepRunning);
    }
}
