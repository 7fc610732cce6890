//! Per-adapter circuit breaker (spec §4.4).
//!
//! `Closed -> Open` when consecutive failures reach `f_max` or the failure
//! ratio over the trailing window reaches `r_max`. `Open -> HalfOpen` after
//! an exponentially growing cooldown. `HalfOpen -> Closed` on `k_success`
//! consecutive probe successes; any failure in `HalfOpen` sends it back to
//! `Open` and doubles the next cooldown.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub f_max: u32,
    pub r_max: f64,
    pub window_size: usize,
    pub cooldown_initial: Duration,
    pub cooldown_max: Duration,
    pub k_success: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            f_max: 5,
            r_max: 0.5,
            window_size: 20,
            cooldown_initial: Duration::from_secs(2),
            cooldown_max: Duration::from_secs(60),
            k_success: 2,
        }
    }
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    consecutive_failures: u32,
    window: VecDeque<bool>,
    half_open_successes: u32,
    current_cooldown: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        let current_cooldown = config.cooldown_initial;
        Self {
            config,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            half_open_successes: 0,
            current_cooldown,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a request may currently be issued: Closed always allows it;
    /// Open allows it only once the cooldown has elapsed (transitioning to
    /// HalfOpen as a side effect); HalfOpen allows limited probing.
    pub fn allow_request(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self.opened_at.map(|at| now.duration_since(at)).unwrap_or_default();
                if elapsed >= self.current_cooldown {
                    self.state = BreakerState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&mut self, now: Instant) {
        self.push_window(true);
        self.consecutive_failures = 0;
        match self.state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.k_success {
                    self.state = BreakerState::Closed;
                    self.current_cooldown = self.config.cooldown_initial;
                    self.opened_at = None;
                }
            }
            BreakerState::Open => {
                // A success while nominally Open means allow_request already
                // transitioned us; treat defensively as HalfOpen progress.
                self.state = BreakerState::HalfOpen;
                self.half_open_successes = 1;
                let _ = now;
            }
        }
    }

    pub fn on_failure(&mut self, now: Instant) {
        self.push_window(false);
        self.consecutive_failures += 1;

        match self.state {
            BreakerState::HalfOpen => self.open(now),
            BreakerState::Closed => {
                if self.consecutive_failures >= self.config.f_max || self.failure_ratio() >= self.config.r_max {
                    self.open(now);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn open(&mut self, now: Instant) {
        if self.state == BreakerState::Open {
            self.current_cooldown = (self.current_cooldown * 2).min(self.config.cooldown_max);
        } else {
            self.current_cooldown = self.config.cooldown_initial;
        }
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.half_open_successes = 0;
    }

    fn push_window(&mut self, success: bool) {
        self.window.push_back(success);
        if self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
    }

    fn failure_ratio(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|s| !**s).count();
        failures as f64 / self.window.len() as f64
    }
}
