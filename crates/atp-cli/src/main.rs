//! Binary entry point for the ATP control plane: loads configuration, wires
//! every service through the Lifecycle Coordinator in spec §4.10's
//! dependency order, serves the admin HTTP surface, and drains on
//! SIGTERM/SIGINT.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use atp_dispatcher::AdapterPort;
use atp_observability::TelemetryConfig;
use atp_registry::{AdapterRegistry, BreakerConfig, HealthConfig, ReadinessConfig};
use atp_routing::RoutingEngine;
use atp_scheduler::{FairScheduler, SchedulerConfig, TenantWeights};
use atp_server::http::{router, AppState, EchoAdapter};
use atp_server::lifecycle::{shutdown_signal, LifecycleCoordinator, StartupStage};
use atp_server::AtpConfig;
use clap::Parser;
use parking_lot::Mutex;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "atp-router")]
#[command(about = "LLM-request control plane: QoS-aware router over the ATP framed protocol")]
struct Args {
    /// Path to a TOML configuration file. Falls back to built-in defaults
    /// (overridable by `ATP_`-prefixed environment variables) if omitted.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let toml_source = match &args.config {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };
    let config = AtpConfig::load(&toml_source)?;

    atp_observability::telemetry::init(&TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    let routing_strategy = atp_routing::bandit::Strategy::parse(&config.routing.strategy)
        .ok_or_else(|| anyhow::anyhow!("unknown routing.strategy: {}", config.routing.strategy))?;
    let _ = routing_strategy;

    let registry = Arc::new(AdapterRegistry::new(
        HealthConfig::default(),
        BreakerConfig {
            f_max: config.breaker.f_max,
            r_max: config.breaker.r_max,
            cooldown_initial: Duration::from_millis(config.breaker.cooldown_initial_ms),
            cooldown_max: Duration::from_millis(config.breaker.cooldown_max_ms),
            ..BreakerConfig::default()
        },
        ReadinessConfig::default(),
    ));

    let routing = Arc::new(RoutingEngine::default());

    let scheduler = Arc::new(Mutex::new(FairScheduler::new(SchedulerConfig {
        tenant_weights: TenantWeights {
            gold: config.scheduler.tenant_weights.gold,
            silver: config.scheduler.tenant_weights.silver,
            bronze: config.scheduler.tenant_weights.bronze,
        },
        queue_high_watermark: config.scheduler.queue_high_watermark_ms as usize,
        queue_low_watermark: config.scheduler.queue_low_watermark_ms as usize,
        starvation_p95_threshold: Duration::from_millis(config.scheduler.starvation_p95_threshold_ms),
        global_concurrency_cap: config.scheduler.global_concurrency_cap,
        per_tenant_concurrency_cap: config.scheduler.per_tenant_concurrency_cap,
        ..SchedulerConfig::default()
    })));

    // No concrete LLM provider adapters are wired by the core (spec §1
    // "Out of scope" names provider clients as external collaborators); an
    // echoing stub keeps `/v1/ask` exercisable end to end until real
    // `AdapterPort` implementations are injected by the deployment.
    let mut adapters: HashMap<String, Arc<dyn AdapterPort>> = HashMap::new();
    adapters.insert("echo".to_string(), Arc::new(EchoAdapter { id: "echo".to_string() }));

    let mut lifecycle = LifecycleCoordinator::new(config.clone(), None);
    // The Lifecycle Coordinator's probes and Observation sink are shared
    // with the HTTP handlers; both sides read/write the same underlying
    // state so the periodic flush loop below drains what `/v1/ask` emits.
    let wired_state = Arc::new(
        AppState::new(
            lifecycle.probes(),
            Arc::clone(&registry),
            Arc::clone(&routing),
            Arc::clone(&scheduler),
            lifecycle.observation_sink(),
        )
        .with_adapters(adapters),
    );

    lifecycle
        .start(|stage| async move {
            info!(stage = stage.name(), "starting");
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("startup failed: {e}"))?;

    lifecycle.spawn_observation_flush(atp_server::lifecycle::bandit_feedback(Arc::clone(&routing)));
    lifecycle.spawn_starvation_detector(
        Arc::clone(&scheduler),
        Duration::from_millis(config.scheduler.starvation_p95_threshold_ms.max(1000)),
    );

    let app = router(Arc::clone(&wired_state));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "atp-router listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    server.await?;

    lifecycle
        .shutdown(
            || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
            },
            || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            },
        )
        .await
        .map_err(|e| anyhow::anyhow!("shutdown did not complete cleanly: {e}"))?;

    Ok(())
}
