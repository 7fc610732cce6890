//! Global tracing/OTel bootstrap (spec §10.1), grounded on
//! `dashflow-observability`'s `TracingConfig`/`init_tracing`: one process-wide
//! subscriber installed at startup, OTLP export optional behind the `otel`
//! feature.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub json_format: bool,
    /// OTLP collector endpoint; only consulted when the `otel` feature is
    /// compiled in.
    pub otlp_endpoint: Option<String>,
    pub sampling_ratio: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { service_name: "atp-router".to_string(), json_format: false, otlp_endpoint: None, sampling_ratio: 1.0 }
    }
}

/// Install the global `tracing` subscriber. Call exactly once during
/// Lifecycle Coordinator startup, before any other service is wired (spec
/// §4.10: clock/IDs is the only thing that comes before telemetry).
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    #[cfg(feature = "otel")]
    {
        if let Some(layer) = build_otel_layer(config)? {
            return registry
                .with(layer)
                .with(fmt_layer(config))
                .try_init()
                .map_err(|e| Error::SubscriberInit(e.to_string()));
        }
    }

    registry.with(fmt_layer(config)).try_init().map_err(|e| Error::SubscriberInit(e.to_string()))
}

fn fmt_layer(config: &TelemetryConfig) -> Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync> {
    if config.json_format {
        Box::new(tracing_subscriber::fmt::layer().json())
    } else {
        Box::new(tracing_subscriber::fmt::layer())
    }
}

#[cfg(feature = "otel")]
fn build_otel_layer(
    config: &TelemetryConfig,
) -> Result<Option<impl tracing_subscriber::Layer<tracing_subscriber::Registry>>> {
    use opentelemetry::{global, KeyValue};
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
    use opentelemetry_sdk::Resource;

    let Some(endpoint) = config.otlp_endpoint.clone() else {
        return Ok(None);
    };

    let resource = Resource::builder_empty()
        .with_attributes(vec![KeyValue::new("service.name", config.service_name.clone())])
        .build();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
        .map_err(|e| Error::ExporterInit(e.to_string()))?;

    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio))
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider);
    let tracer = global::tracer("atp-router");
    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_disables_otlp() {
        let config = TelemetryConfig::default();
        assert!(config.otlp_endpoint.is_none());
    }
}
