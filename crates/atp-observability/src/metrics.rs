//! Prometheus metrics for the control plane (spec §10.1), grounded on
//! `dashflow-streaming::metrics_utils`'s safe-registration pattern: register
//! once into a process-global registry, and if a metric with the same name
//! is already registered (common in tests that construct the core twice),
//! log and reuse rather than panic.

use std::sync::LazyLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts};
use tracing::{debug, warn};

static COUNTER_VECS: LazyLock<DashMap<String, CounterVec>> = LazyLock::new(DashMap::new);
static HISTOGRAM_VECS: LazyLock<DashMap<String, HistogramVec>> = LazyLock::new(DashMap::new);

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    match COUNTER_VECS.entry(name.to_string()) {
        Entry::Occupied(entry) => entry.get().clone(),
        Entry::Vacant(entry) => {
            let metric = CounterVec::new(Opts::new(name, help), labels)
                .unwrap_or_else(|e| panic!("invalid counter vec {name}: {e}"));
            if let Err(e) = prometheus::default_registry().register(Box::new(metric.clone())) {
                match e {
                    prometheus::Error::AlreadyReg => debug!(metric = name, "counter already registered"),
                    other => warn!(metric = name, error = %other, "counter registration failed"),
                }
            }
            entry.insert(metric.clone());
            metric
        }
    }
}

fn histogram_vec(name: &str, help: &str, labels: &[&str], buckets: Vec<f64>) -> HistogramVec {
    match HISTOGRAM_VECS.entry(name.to_string()) {
        Entry::Occupied(entry) => entry.get().clone(),
        Entry::Vacant(entry) => {
            let metric = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
                .unwrap_or_else(|e| panic!("invalid histogram vec {name}: {e}"));
            if let Err(e) = prometheus::default_registry().register(Box::new(metric.clone())) {
                match e {
                    prometheus::Error::AlreadyReg => debug!(metric = name, "histogram already registered"),
                    other => warn!(metric = name, error = %other, "histogram registration failed"),
                }
            }
            entry.insert(metric.clone());
            metric
        }
    }
}

/// Process-wide ATP metrics. Cloning is cheap — every field is an `Arc`-backed
/// prometheus handle, matching `CounterVec::clone`'s semantics.
#[derive(Debug, Clone)]
pub struct AtpMetrics {
    pub frames_total: CounterVec,
    pub checksum_failures_total: CounterVec,
    pub replays_rejected_total: CounterVec,
    pub preemptions_total: CounterVec,
    pub breaker_transitions_total: CounterVec,
    pub ecn_marked_total: CounterVec,
    pub observations_dropped_total: CounterVec,
    pub task_panics_total: CounterVec,
    pub admission_latency_ms: HistogramVec,
    pub dispatch_latency_ms: HistogramVec,
    pub ack_round_trip_ms: HistogramVec,
}

impl AtpMetrics {
    /// Register (or reuse) the global metric set. Cheap to call repeatedly —
    /// the underlying `prometheus` registrations are memoized.
    pub fn global() -> Self {
        Self {
            frames_total: counter_vec("atp_frames_total", "Frames encoded or decoded", &["direction", "frame_type"]),
            checksum_failures_total: counter_vec(
                "atp_checksum_failures_total",
                "Frames rejected for checksum mismatch",
                &["session_id"],
            ),
            replays_rejected_total: counter_vec(
                "atp_replays_rejected_total",
                "Frames rejected as replays",
                &["session_id"],
            ),
            preemptions_total: counter_vec(
                "atp_preemptions_total",
                "Scheduler preemptions",
                &["tenant_id", "preempted_tier"],
            ),
            breaker_transitions_total: counter_vec(
                "atp_breaker_transitions_total",
                "Circuit breaker state transitions",
                &["adapter_id", "to_state"],
            ),
            ecn_marked_total: counter_vec("atp_ecn_marked_total", "WINDOW_UPDATE frames with the ECN flag set", &["session_id"]),
            observations_dropped_total: counter_vec(
                "atp_observations_dropped_total",
                "Observations dropped from the bounded sink buffer",
                &["reason"],
            ),
            task_panics_total: counter_vec(
                "atp_task_panics_total",
                "Background tasks that terminated via panic",
                &["task"],
            ),
            admission_latency_ms: histogram_vec(
                "atp_admission_latency_ms",
                "Time from enqueue to scheduler admission",
                &["tenant_id"],
                vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
            ),
            dispatch_latency_ms: histogram_vec(
                "atp_dispatch_latency_ms",
                "End-to-end adapter dispatch latency",
                &["adapter_id"],
                vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0],
            ),
            ack_round_trip_ms: histogram_vec(
                "atp_ack_round_trip_ms",
                "Time between a DATA frame and its ACK",
                &["session_id"],
                vec![1.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_idempotent_across_repeated_calls() {
        let a = AtpMetrics::global();
        let b = AtpMetrics::global();
        a.frames_total.with_label_values(&["rx", "DATA"]).inc();
        b.frames_total.with_label_values(&["rx", "DATA"]).inc();
        assert_eq!(a.frames_total.with_label_values(&["rx", "DATA"]).get(), 2.0);
    }
}
