//! Telemetry bootstrap, Prometheus metrics, and the bounded Observation
//! sink (spec §4.9, §10.1).

pub mod error;
pub mod flush;
pub mod metrics;
pub mod observation;
pub mod telemetry;

pub use error::{Error, Result};
pub use flush::{flush_once, spawn_flush_loop};
pub use metrics::AtpMetrics;
pub use observation::{hash_prompt, Observation, ObservationPort, ObservationSink, SinkConfig, OBSERVATION_SCHEMA_VERSION};
pub use telemetry::TelemetryConfig;
