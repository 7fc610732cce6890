//! ε-greedy (spec §4.5 "Greedy: argmax empirical mean reward, with
//! ε-exploration").

use rand::Rng;

use super::ArmStats;

pub fn select<R: Rng + ?Sized>(candidates: &[ArmStats], epsilon: f64, rng: &mut R) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if rng.gen_bool(epsilon.clamp(0.0, 1.0)) {
        return Some(rng.gen_range(0..candidates.len()));
    }
    candidates
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.mean_reward().partial_cmp(&b.mean_reward()).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
}
