use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("telemetry already initialized")]
    AlreadyInitialized,

    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    #[cfg(feature = "otel")]
    #[error("failed to build OTLP exporter: {0}")]
    ExporterInit(String),
}
