//! Anti-replay nonce tracking (spec §3 Frame invariant: "nonces are unique
//! within a configurable anti-replay window").

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct ReplayPolicy {
    pub window: Duration,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self { window: Duration::from_secs(60) }
    }
}

/// A bounded cache of recently seen nonces. Entries older than `window` are
/// swept lazily on each `check`.
pub struct ReplayGuard {
    policy: ReplayPolicy,
    seen: HashMap<String, Instant>,
}

impl ReplayGuard {
    pub fn new(policy: ReplayPolicy) -> Self {
        Self { policy, seen: HashMap::new() }
    }

    /// Returns `true` if `nonce` is fresh (not seen within `window`) and
    /// records it; returns `false` if it's a replay.
    pub fn check_and_record(&mut self, nonce: &str, now: Instant) -> bool {
        self.sweep(now);
        if self.seen.contains_key(nonce) {
            return false;
        }
        self.seen.insert(nonce.to_string(), now);
        true
    }

    fn sweep(&mut self, now: Instant) {
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) <= self.policy.window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
