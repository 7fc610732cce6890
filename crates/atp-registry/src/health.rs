//! Per-adapter health tracking (spec §4.3): EWMA latency percentiles and
//! error rate, with a staleness factor that demotes adapters the registry
//! hasn't heard from recently.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    /// EWMA smoothing factor. Higher weights recent samples more.
    pub ewma_alpha: f64,
    /// Age beyond which a health record is considered stale.
    pub staleness_threshold_secs: f64,
    /// Time constant τ for the staleness decay `F = exp(-Δt/τ)`.
    pub staleness_tau_secs: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { ewma_alpha: 0.2, staleness_threshold_secs: 30.0, staleness_tau_secs: 30.0 }
    }
}

#[derive(Debug, Clone)]
pub struct HealthRecord {
    config: HealthConfig,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_rate: f64,
    pub requests_per_second: f64,
    pub queue_depth: u64,
    pub last_update: DateTime<Utc>,
    initialized: bool,
}

impl HealthRecord {
    pub fn new(config: HealthConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            error_rate: 0.0,
            requests_per_second: 0.0,
            queue_depth: 0,
            last_update: now,
            initialized: false,
        }
    }

    /// Fold in a new HEALTH sample using exponential smoothing. The first
    /// sample seeds the record directly rather than being blended against
    /// zero-initialized fields.
    pub fn observe(
        &mut self,
        p50_ms: f64,
        p95_ms: f64,
        p99_ms: f64,
        error_rate: f64,
        requests_per_second: f64,
        queue_depth: u64,
        now: DateTime<Utc>,
    ) {
        let a = self.config.ewma_alpha;
        if self.initialized {
            self.p50_ms = a * p50_ms + (1.0 - a) * self.p50_ms;
            self.p95_ms = a * p95_ms + (1.0 - a) * self.p95_ms;
            self.p99_ms = a * p99_ms + (1.0 - a) * self.p99_ms;
            self.error_rate = a * error_rate + (1.0 - a) * self.error_rate;
            self.requests_per_second = a * requests_per_second + (1.0 - a) * self.requests_per_second;
        } else {
            self.p50_ms = p50_ms;
            self.p95_ms = p95_ms;
            self.p99_ms = p99_ms;
            self.error_rate = error_rate;
            self.requests_per_second = requests_per_second;
            self.initialized = true;
        }
        self.queue_depth = queue_depth;
        self.last_update = now;
    }

    /// `F = exp(-Δt/τ)`: 1.0 when freshly updated, decaying toward 0 as the
    /// record ages. Routing scores are multiplied by this factor.
    pub fn staleness_factor(&self, now: DateTime<Utc>) -> f64 {
        let delta_secs = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
        (-delta_secs / self.config.staleness_tau_secs).exp()
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let delta_secs = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
        delta_secs > self.config.staleness_threshold_secs
    }

    /// Readiness per spec §4.3: health present within the staleness window,
    /// p95 and error_rate within SLO. Breaker state is checked separately by
    /// the registry (it owns both the breaker and the health record).
    pub fn meets_slo(&self, now: DateTime<Utc>, p95_slo_ms: f64, error_rate_slo: f64) -> bool {
        self.initialized && !self.is_stale(now) && self.p95_ms <= p95_slo_ms && self.error_rate <= error_rate_slo
    }
}
