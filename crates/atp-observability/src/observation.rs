//! The Observation record (spec §6) and the bounded, drop-oldest
//! Observation Sink (spec §4.9), grounded on `dashflow-streaming`'s
//! dead-letter-queue sizing/backpressure conventions (`dlq.rs`): a bounded
//! ring buffer with an explicit loss counter rather than an unbounded
//! channel that could OOM under adapter-side pressure.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::metrics::AtpMetrics;

/// Exactly the fields spec §6 names for the Observation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub request_id: String,
    pub tenant_id: String,
    pub adapter_id: String,
    pub model_id: String,
    pub strategy: String,
    pub estimated_cost_micros: u64,
    pub actual_cost_micros: u64,
    pub estimated_latency_ms: f64,
    pub actual_latency_ms: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub success: bool,
    pub error_code: Option<String>,
    pub quality_score: Option<f64>,
    pub shadow_of: Option<String>,
    pub redacted_prompt_hash: String,
    pub schema_version: u32,
}

pub const OBSERVATION_SCHEMA_VERSION: u32 = 1;

/// SHA-256 hex digest of a raw prompt, for `Observation::redacted_prompt_hash`
/// — the sink never sees or stores the prompt text itself.
pub fn hash_prompt(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub buffer_capacity: usize,
    pub flush_interval: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { buffer_capacity: 10_000, flush_interval: Duration::from_secs(1) }
    }
}

struct SinkState {
    buffer: VecDeque<Observation>,
    dropped_total: u64,
}

/// Append-only buffer of `Observation`s with bounded memory: once at
/// capacity, `append` drops the oldest entry and increments a loss counter
/// rather than blocking or growing unbounded (spec §4.9 "On overflow, drop
/// oldest and increment a loss counter").
pub struct ObservationSink {
    config: SinkConfig,
    state: Mutex<SinkState>,
    metrics: AtpMetrics,
}

impl ObservationSink {
    pub fn new(config: SinkConfig, metrics: AtpMetrics) -> Self {
        Self {
            config,
            state: Mutex::new(SinkState { buffer: VecDeque::new(), dropped_total: 0 }),
            metrics,
        }
    }

    /// Record one Observation for a request. Never blocks — at most a
    /// mutex critical section bounded by a `VecDeque` push/pop (spec §4.9
    /// "bounded mutex or actor/channel pattern").
    pub fn append(&self, observation: Observation) {
        let mut state = self.state.lock();
        if state.buffer.len() >= self.config.buffer_capacity {
            state.buffer.pop_front();
            state.dropped_total += 1;
            self.metrics.observations_dropped_total.with_label_values(&["buffer_full"]).inc();
        }
        state.buffer.push_back(observation);
    }

    pub fn dropped_total(&self) -> u64 {
        self.state.lock().dropped_total
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    /// Drain everything currently buffered. Called on the periodic flush
    /// tick and once more during shutdown drain (spec §4.10 step 4: "flush
    /// Observation buffer").
    pub fn drain(&self) -> Vec<Observation> {
        let mut state = self.state.lock();
        state.buffer.drain(..).collect()
    }

    pub fn config(&self) -> SinkConfig {
        self.config
    }
}

/// The two destinations a flush fans drained observations out to (spec
/// §4.9: "hands observations to (i) the Routing Engine's bandit updater and
/// (ii) an external Observation port").
pub trait ObservationPort: Send + Sync {
    fn append(&self, observation: &Observation);
}

pub fn fake_observation(request_id: &str, adapter_id: &str, success: bool, now: DateTime<Utc>) -> Observation {
    let _ = now;
    Observation {
        request_id: request_id.to_string(),
        tenant_id: "tenant-a".to_string(),
        adapter_id: adapter_id.to_string(),
        model_id: "model-x".to_string(),
        strategy: "champion".to_string(),
        estimated_cost_micros: 100,
        actual_cost_micros: 110,
        estimated_latency_ms: 500.0,
        actual_latency_ms: 480.0,
        tokens_in: 100,
        tokens_out: 200,
        success,
        error_code: if success { None } else { Some("EADAPTER".to_string()) },
        quality_score: Some(0.9),
        shadow_of: None,
        redacted_prompt_hash: hash_prompt("test prompt"),
        schema_version: OBSERVATION_SCHEMA_VERSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_under_capacity_does_not_drop() {
        let sink = ObservationSink::new(SinkConfig { buffer_capacity: 4, ..Default::default() }, AtpMetrics::global());
        for i in 0..4 {
            sink.append(fake_observation(&format!("r{i}"), "a", true, Utc::now()));
        }
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.dropped_total(), 0);
    }

    #[test]
    fn append_over_capacity_drops_oldest_and_counts_loss() {
        let sink = ObservationSink::new(SinkConfig { buffer_capacity: 2, ..Default::default() }, AtpMetrics::global());
        sink.append(fake_observation("r0", "a", true, Utc::now()));
        sink.append(fake_observation("r1", "a", true, Utc::now()));
        sink.append(fake_observation("r2", "a", true, Utc::now()));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.dropped_total(), 1);
        let drained = sink.drain();
        assert_eq!(drained[0].request_id, "r1");
        assert_eq!(drained[1].request_id, "r2");
    }

    #[test]
    fn drain_empties_the_buffer() {
        let sink = ObservationSink::new(SinkConfig::default(), AtpMetrics::global());
        sink.append(fake_observation("r0", "a", true, Utc::now()));
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn hash_prompt_is_deterministic_and_hides_content() {
        let a = hash_prompt("secret prompt");
        let b = hash_prompt("secret prompt");
        assert_eq!(a, b);
        assert!(!a.contains("secret"));
    }
}
