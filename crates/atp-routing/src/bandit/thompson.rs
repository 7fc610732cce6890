//! Thompson sampling (spec §4.5): sample θ from each feasible adapter's
//! Beta posterior and pick argmax.

use rand::Rng;
use rand_distr::{Beta, Distribution};

use super::ArmStats;

/// Draws one posterior sample for `stats`. Falls back to the posterior
/// mean if the Beta distribution cannot be constructed (both parameters
/// must be positive, which the `ArmStats` invariant — starting at 1.0 and
/// only ever incrementing — always guarantees, but we don't want a panic
/// on any future refactor that loosens that).
pub fn sample<R: Rng + ?Sized>(stats: &ArmStats, rng: &mut R) -> f64 {
    match Beta::new(stats.alpha, stats.beta) {
        Ok(dist) => dist.sample(rng),
        Err(_) => stats.mean_reward(),
    }
}

/// Pick the index of the candidate with the highest sampled θ. Returns
/// `None` for an empty candidate list.
pub fn select<R: Rng + ?Sized>(candidates: &[ArmStats], rng: &mut R) -> Option<usize> {
    candidates
        .iter()
        .map(|stats| sample(stats, rng))
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
}
