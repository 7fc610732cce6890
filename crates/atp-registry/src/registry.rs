//! The adapter registry proper (spec §4.3): maps `AdapterID` to capability,
//! health, and breaker state, and answers `list_compatible`/readiness
//! queries for the Routing Engine.
//!
//! Read-mostly, guarded by a reader/writer discipline — `dashmap` gives us
//! per-key locking so an EWMA health update for one adapter never blocks a
//! `list_compatible` scan touching a different adapter, matching the
//! teacher's registry concurrency model.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::capability::{AdapterCapability, CapabilityRequest};
use crate::errors::{Error, Result};
use crate::health::{HealthConfig, HealthRecord};

/// SLO thresholds the readiness gate checks health against (spec §4.3:
/// "ready iff health is present within the staleness window AND p95 ≤ SLO
/// AND error_rate ≤ SLO AND circuit breaker is Closed or HalfOpen").
#[derive(Debug, Clone, Copy)]
pub struct ReadinessConfig {
    pub p95_slo_ms: f64,
    pub error_rate_slo: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { p95_slo_ms: 2_000.0, error_rate_slo: 0.1 }
    }
}

struct AdapterState {
    capability: AdapterCapability,
    health: HealthRecord,
    breaker: Mutex<CircuitBreaker>,
}

/// A read-only view of one adapter's state, handed out to callers that need
/// to reason about more than a single boolean (e.g. the Routing Engine's
/// scoring pass).
pub struct AdapterEntry {
    pub capability: AdapterCapability,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_rate: f64,
    pub staleness_factor: f64,
    pub breaker_state: BreakerState,
    pub ready: bool,
}

pub struct RegistrySnapshot {
    pub entries: Vec<AdapterEntry>,
}

pub struct AdapterRegistry {
    adapters: DashMap<String, AdapterState>,
    health_config: HealthConfig,
    breaker_config: BreakerConfig,
    readiness: ReadinessConfig,
}

impl AdapterRegistry {
    pub fn new(health_config: HealthConfig, breaker_config: BreakerConfig, readiness: ReadinessConfig) -> Self {
        Self { adapters: DashMap::new(), health_config, breaker_config, readiness }
    }

    /// Register or re-advertise an adapter (spec §4.3 "Registration").
    /// Re-advertisement is idempotent; a materially different capability
    /// bumps `version` rather than overwriting health/breaker state.
    pub fn register(&self, mut capability: AdapterCapability, now: DateTime<Utc>) -> Result<()> {
        capability.validate()?;
        match self.adapters.get_mut(&capability.adapter_id) {
            Some(mut existing) => {
                if capability.materially_differs_from(&existing.capability) {
                    capability.version = existing.capability.version + 1;
                }
                existing.capability = capability;
            }
            None => {
                let adapter_id = capability.adapter_id.clone();
                self.adapters.insert(
                    adapter_id,
                    AdapterState {
                        capability,
                        health: HealthRecord::new(self.health_config, now),
                        breaker: Mutex::new(CircuitBreaker::new(self.breaker_config)),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn deregister(&self, adapter_id: &str) {
        self.adapters.remove(adapter_id);
    }

    /// Fold in a HEALTH frame's telemetry (spec §4.3 "Health updates").
    pub fn observe_health(
        &self,
        adapter_id: &str,
        p50_ms: f64,
        p95_ms: f64,
        p99_ms: f64,
        error_rate: f64,
        requests_per_second: f64,
        queue_depth: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut entry = self.adapters.get_mut(adapter_id).ok_or_else(|| Error::NotFound(adapter_id.to_string()))?;
        entry.health.observe(p50_ms, p95_ms, p99_ms, error_rate, requests_per_second, queue_depth, now);
        Ok(())
    }

    pub fn record_success(&self, adapter_id: &str, now: std::time::Instant) -> Result<()> {
        let entry = self.adapters.get(adapter_id).ok_or_else(|| Error::NotFound(adapter_id.to_string()))?;
        entry.breaker.lock().on_success(now);
        Ok(())
    }

    pub fn record_failure(&self, adapter_id: &str, now: std::time::Instant) -> Result<()> {
        let entry = self.adapters.get(adapter_id).ok_or_else(|| Error::NotFound(adapter_id.to_string()))?;
        entry.breaker.lock().on_failure(now);
        Ok(())
    }

    /// Whether `adapter_id` currently allows a request (breaker check before
    /// dispatch, spec §4.4: "The Dispatcher consults the breaker before
    /// issuing a request").
    pub fn allow_request(&self, adapter_id: &str, now: std::time::Instant) -> Result<bool> {
        let entry = self.adapters.get(adapter_id).ok_or_else(|| Error::NotFound(adapter_id.to_string()))?;
        Ok(entry.breaker.lock().allow_request(now))
    }

    pub fn breaker_state(&self, adapter_id: &str) -> Result<BreakerState> {
        let entry = self.adapters.get(adapter_id).ok_or_else(|| Error::NotFound(adapter_id.to_string()))?;
        Ok(entry.breaker.lock().state())
    }

    fn entry_snapshot(&self, adapter_id: &str, state: &AdapterState, now: DateTime<Utc>) -> AdapterEntry {
        let breaker_state = state.breaker.lock().state();
        let ready = state.health.meets_slo(now, self.readiness.p95_slo_ms, self.readiness.error_rate_slo)
            && matches!(breaker_state, BreakerState::Closed | BreakerState::HalfOpen);
        let _ = adapter_id;
        AdapterEntry {
            capability: state.capability.clone(),
            p50_ms: state.health.p50_ms,
            p95_ms: state.health.p95_ms,
            p99_ms: state.health.p99_ms,
            error_rate: state.health.error_rate,
            staleness_factor: state.health.staleness_factor(now),
            breaker_state,
            ready,
        }
    }

    /// Whether `adapter_id` is ready per spec §4.3's readiness gate.
    pub fn is_ready(&self, adapter_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let entry = self.adapters.get(adapter_id).ok_or_else(|| Error::NotFound(adapter_id.to_string()))?;
        Ok(self.entry_snapshot(adapter_id, &entry, now).ready)
    }

    /// `list_compatible(request)` (spec §4.3 "Queries"): adapters whose
    /// advertised capability satisfies the request, in registration order.
    /// Ordering by fitness is the Routing Engine's job, not this crate's.
    pub fn list_compatible(&self, request: &CapabilityRequest, now: DateTime<Utc>) -> RegistrySnapshot {
        let entries = self
            .adapters
            .iter()
            .filter(|kv| kv.value().capability.satisfies(request))
            .map(|kv| self.entry_snapshot(kv.key(), kv.value(), now))
            .collect();
        RegistrySnapshot { entries }
    }

    /// All registered adapters regardless of compatibility, e.g. for an
    /// admin surface or metrics export.
    pub fn all(&self, now: DateTime<Utc>) -> RegistrySnapshot {
        let entries = self.adapters.iter().map(|kv| self.entry_snapshot(kv.key(), kv.value(), now)).collect();
        RegistrySnapshot { entries }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::{Duration, Instant};

    fn cap(id: &str) -> AdapterCapability {
        AdapterCapability {
            adapter_id: id.into(),
            version: 1,
            models: vec!["model-x".into()],
            max_tokens: 8192,
            supported_languages: ["en"].iter().map(|s| s.to_string()).collect(),
            feature_bits: BTreeSet::new(),
            cost_per_input_token_micros: 1.0,
            cost_per_output_token_micros: 2.0,
            cost_per_request_micros: 0.0,
        }
    }

    #[test]
    fn register_then_list_compatible_finds_matching_adapter() {
        let registry =
            AdapterRegistry::new(HealthConfig::default(), BreakerConfig::default(), ReadinessConfig::default());
        let now = Utc::now();
        registry.register(cap("a"), now).unwrap();

        let mut req = CapabilityRequest::default();
        req.required_languages.insert("en".into());
        let snapshot = registry.list_compatible(&req, now);
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].capability.adapter_id, "a");
    }

    #[test]
    fn re_registration_is_idempotent_unless_materially_different() {
        let registry =
            AdapterRegistry::new(HealthConfig::default(), BreakerConfig::default(), ReadinessConfig::default());
        let now = Utc::now();
        registry.register(cap("a"), now).unwrap();
        registry.register(cap("a"), now).unwrap();
        let snapshot = registry.all(now);
        assert_eq!(snapshot.entries[0].capability.version, 1);

        let mut changed = cap("a");
        changed.max_tokens = 4096;
        registry.register(changed, now).unwrap();
        let snapshot = registry.all(now);
        assert_eq!(snapshot.entries[0].capability.version, 2);
    }

    #[test]
    fn not_ready_until_health_observed() {
        let registry =
            AdapterRegistry::new(HealthConfig::default(), BreakerConfig::default(), ReadinessConfig::default());
        let now = Utc::now();
        registry.register(cap("a"), now).unwrap();
        assert!(!registry.is_ready("a", now).unwrap());

        registry.observe_health("a", 50.0, 100.0, 150.0, 0.0, 10.0, 0, now).unwrap();
        assert!(registry.is_ready("a", now).unwrap());
    }

    #[test]
    fn breaker_open_makes_adapter_not_ready() {
        let registry = AdapterRegistry::new(
            HealthConfig::default(),
            BreakerConfig { f_max: 1, ..Default::default() },
            ReadinessConfig::default(),
        );
        let now = Utc::now();
        registry.register(cap("a"), now).unwrap();
        registry.observe_health("a", 50.0, 100.0, 150.0, 0.0, 10.0, 0, now).unwrap();
        assert!(registry.is_ready("a", now).unwrap());

        registry.record_failure("a", Instant::now()).unwrap();
        assert_eq!(registry.breaker_state("a").unwrap(), BreakerState::Open);
        assert!(!registry.is_ready("a", now).unwrap());
    }

    #[test]
    fn allow_request_respects_cooldown() {
        let registry = AdapterRegistry::new(
            HealthConfig::default(),
            BreakerConfig { f_max: 1, cooldown_initial: Duration::from_millis(5), ..Default::default() },
            ReadinessConfig::default(),
        );
        let now = Utc::now();
        registry.register(cap("a"), now).unwrap();
        let t0 = Instant::now();
        registry.record_failure("a", t0).unwrap();
        assert!(!registry.allow_request("a", t0).unwrap());
        assert!(registry.allow_request("a", t0 + Duration::from_millis(10)).unwrap());
    }
}
