//! Per-session triplet budget counters (spec §3 "Budget"): `remaining_tokens
//! ≥ 0` and `remaining_usd_micros ≥ 0` must hold at all times; a preflight
//! check denies any request that would cross zero, leaving counters
//! unchanged (spec §8 "Preflight budget" property).

use atp_protocol::Window;

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    remaining_parallel: u32,
    remaining_tokens: u64,
    remaining_usd_micros: u64,
}

impl Budget {
    pub fn from_window(window: Window) -> Self {
        Self {
            remaining_parallel: window.max_parallel,
            remaining_tokens: window.max_tokens,
            remaining_usd_micros: window.max_usd_micros,
        }
    }

    pub fn remaining_parallel(&self) -> u32 {
        self.remaining_parallel
    }

    pub fn remaining_tokens(&self) -> u64 {
        self.remaining_tokens
    }

    pub fn remaining_usd_micros(&self) -> u64 {
        self.remaining_usd_micros
    }

    /// Whether admitting a request estimated at `tokens`/`usd_micros` would
    /// keep every counter non-negative, without mutating state.
    pub fn can_afford(&self, tokens: u64, usd_micros: u64) -> bool {
        self.remaining_parallel >= 1 && self.remaining_tokens >= tokens && self.remaining_usd_micros >= usd_micros
    }

    /// Reserve `tokens`/`usd_micros` and one parallel slot. Returns `false`
    /// (leaving counters untouched) if the reservation would drive any
    /// counter negative — the EWINDOW case.
    pub fn reserve(&mut self, tokens: u64, usd_micros: u64) -> bool {
        if !self.can_afford(tokens, usd_micros) {
            return false;
        }
        self.remaining_parallel -= 1;
        self.remaining_tokens -= tokens;
        self.remaining_usd_micros -= usd_micros;
        true
    }

    /// Release a previously reserved parallel slot and (typically smaller)
    /// actual usage back into the budget, called once a request completes
    /// and actual cost/tokens are known. Token/usd refunds are the
    /// difference between the reservation and the actual spend.
    pub fn release(&mut self, refund_tokens: u64, refund_usd_micros: u64) {
        self.remaining_parallel += 1;
        self.remaining_tokens = self.remaining_tokens.saturating_add(refund_tokens);
        self.remaining_usd_micros = self.remaining_usd_micros.saturating_add(refund_usd_micros);
    }

    pub fn set_window(&mut self, window: Window) {
        self.remaining_parallel = window.max_parallel;
        self.remaining_tokens = window.max_tokens;
        self.remaining_usd_micros = window.max_usd_micros;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_denies_requests_that_would_go_negative_and_leaves_counters_unchanged() {
        let mut budget = Budget::from_window(Window::new(4, 100, 1_000));
        assert!(!budget.reserve(200, 500));
        assert_eq!(budget.remaining_tokens(), 100);
        assert_eq!(budget.remaining_usd_micros(), 1_000);
    }

    #[test]
    fn reserve_then_release_round_trips() {
        let mut budget = Budget::from_window(Window::new(4, 100, 1_000));
        assert!(budget.reserve(50, 500));
        assert_eq!(budget.remaining_parallel(), 3);
        budget.release(50, 500);
        assert_eq!(budget.remaining_parallel(), 4);
        assert_eq!(budget.remaining_tokens(), 100);
    }

    #[test]
    fn zero_remaining_parallel_denies_any_reservation() {
        let mut budget = Budget::from_window(Window::new(0, 100, 1_000));
        assert!(!budget.reserve(1, 1));
    }
}
