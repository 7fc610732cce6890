//! Periodic flush of the Observation sink to its consumers (spec §4.9:
//! "Periodic flush (default 1 s) hands observations to (i) the Routing
//! Engine's bandit updater and (ii) an external Observation port").

use std::sync::Arc;

use crate::observation::{Observation, ObservationPort, ObservationSink};

/// Fan a batch of drained observations out to the bandit updater and the
/// external port. The Routing Engine closure computes its own reward from
/// each Observation — this crate has no dependency on `atp-routing`.
pub fn flush_once(sink: &ObservationSink, mut on_observation: impl FnMut(&Observation), port: Option<&dyn ObservationPort>) {
    for observation in sink.drain() {
        on_observation(&observation);
        if let Some(port) = port {
            port.append(&observation);
        }
    }
}

/// Spawn the periodic flush loop. Exits when `shutdown` resolves, after one
/// final flush, matching the Lifecycle Coordinator's shutdown step 4 (spec
/// §4.10: "flush Observation buffer" runs as the final drain step too).
pub fn spawn_flush_loop<F>(
    sink: Arc<ObservationSink>,
    port: Option<Arc<dyn ObservationPort>>,
    mut on_observation: F,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut(&Observation) + Send + 'static,
{
    let interval = sink.config().flush_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush_once(&sink, &mut on_observation, port.as_deref());
                }
                _ = &mut shutdown => {
                    flush_once(&sink, &mut on_observation, port.as_deref());
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AtpMetrics;
    use crate::observation::{fake_observation, SinkConfig};
    use chrono::Utc;

    #[test]
    fn flush_once_visits_every_buffered_observation() {
        let sink = ObservationSink::new(SinkConfig::default(), AtpMetrics::global());
        sink.append(fake_observation("r0", "a", true, Utc::now()));
        sink.append(fake_observation("r1", "a", true, Utc::now()));

        let mut seen = Vec::new();
        flush_once(&sink, |obs| seen.push(obs.request_id.clone()), None);

        assert_eq!(seen, vec!["r0".to_string(), "r1".to_string()]);
        assert!(sink.is_empty());
    }
}
