//! The Lifecycle Coordinator (spec §4.10): dependency-ordered startup,
//! deadline-bounded draining shutdown, and the three health probes.
//! Grounded on `dashflow-registry::api::server::ApiServer::run_until`'s
//! `with_graceful_shutdown` pattern, generalized from "stop the HTTP
//! listener" to the full drain sequence the spec describes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atp_observability::{flush_once, AtpMetrics, Observation, ObservationPort, ObservationSink};
use atp_routing::RoutingEngine;
use atp_scheduler::FairScheduler;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::AtpConfig;
use crate::errors::{Error, Result};

/// The bootstrap stages, in the dependency order spec §4.10 mandates:
/// "clock/IDs → codec → registry → breakers → scheduler/flow → routing →
/// dispatcher → sessions → observation → API surface".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupStage {
    ClockAndIds,
    Codec,
    Registry,
    Breakers,
    SchedulerAndFlow,
    Routing,
    Dispatcher,
    Sessions,
    Observation,
    ApiSurface,
}

impl StartupStage {
    pub const ORDER: [StartupStage; 10] = [
        StartupStage::ClockAndIds,
        StartupStage::Codec,
        StartupStage::Registry,
        StartupStage::Breakers,
        StartupStage::SchedulerAndFlow,
        StartupStage::Routing,
        StartupStage::Dispatcher,
        StartupStage::Sessions,
        StartupStage::Observation,
        StartupStage::ApiSurface,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StartupStage::ClockAndIds => "clock_and_ids",
            StartupStage::Codec => "codec",
            StartupStage::Registry => "registry",
            StartupStage::Breakers => "breakers",
            StartupStage::SchedulerAndFlow => "scheduler_and_flow",
            StartupStage::Routing => "routing",
            StartupStage::Dispatcher => "dispatcher",
            StartupStage::Sessions => "sessions",
            StartupStage::Observation => "observation",
            StartupStage::ApiSurface => "api_surface",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Booting,
    Ready,
    Draining,
    Stopped,
}

#[derive(Debug, Default)]
struct ProbeState {
    startup_complete: AtomicBool,
    accepting_traffic: AtomicBool,
    live: AtomicBool,
}

/// Shared liveness/readiness/startup flags the admin HTTP surface reads.
#[derive(Clone)]
pub struct HealthProbes {
    state: Arc<ProbeState>,
}

impl HealthProbes {
    pub fn new() -> Self {
        let state = ProbeState { live: AtomicBool::new(true), ..ProbeState::default() };
        Self { state: Arc::new(state) }
    }

    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.state.accepting_traffic.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.state.startup_complete.load(Ordering::SeqCst)
    }

    fn mark_started(&self) {
        self.state.startup_complete.store(true, Ordering::SeqCst);
    }

    fn set_accepting_traffic(&self, accepting: bool) {
        self.state.accepting_traffic.store(accepting, Ordering::SeqCst);
    }

    fn mark_not_live(&self) {
        self.state.live.store(false, Ordering::SeqCst);
    }
}

impl Default for HealthProbes {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives startup and shutdown. Each stage is a boxed closure so callers can
/// wire real service construction without this crate depending on every
/// concrete type; `atp-cli` supplies the closures.
pub struct LifecycleCoordinator {
    config: AtpConfig,
    probes: HealthProbes,
    observation_sink: Arc<ObservationSink>,
    observation_port: Option<Arc<dyn ObservationPort>>,
    phase: LifecyclePhase,
    /// Shutdown sender and join handle for the periodic flush loop started
    /// by `spawn_observation_flush`, if any (spec §4.9 "Periodic flush").
    flush: Option<(oneshot::Sender<()>, tokio::task::JoinHandle<()>)>,
    /// Shutdown sender and join handle for the starvation-detector loop
    /// started by `spawn_starvation_detector`, if any (spec §4.6).
    starvation: Option<(oneshot::Sender<()>, tokio::task::JoinHandle<()>)>,
}

impl LifecycleCoordinator {
    pub fn new(config: AtpConfig, observation_port: Option<Arc<dyn ObservationPort>>) -> Self {
        let sink_config = atp_observability::SinkConfig::default();
        Self {
            config,
            probes: HealthProbes::new(),
            observation_sink: Arc::new(ObservationSink::new(sink_config, AtpMetrics::global())),
            observation_port,
            phase: LifecyclePhase::Booting,
            flush: None,
            starvation: None,
        }
    }

    /// Starts the periodic Observation flush (spec §4.9 "Periodic flush
    /// (default 1 s)") for the remaining lifetime of the process, feeding
    /// every drained Observation to `on_observation` — typically the
    /// Routing Engine's bandit posterior update (spec §2 "updates feed back
    /// to Routing Engine and Health tracker") — and to the external
    /// Observation port. Call once, after `start()` returns; `shutdown`
    /// stops this same loop with one final flush rather than spawning a
    /// second one.
    pub fn spawn_observation_flush<F>(&mut self, on_observation: F)
    where
        F: FnMut(&Observation) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = atp_observability::spawn_flush_loop(
            Arc::clone(&self.observation_sink),
            self.observation_port.clone(),
            on_observation,
            rx,
        );
        self.flush = Some((tx, handle));
    }

    /// Runs the Fair Scheduler's starvation detector on a fixed tick for the
    /// remaining lifetime of the process (spec §4.6 "starvation detector").
    /// Call once, after `start()` returns; `shutdown` stops this same loop.
    pub fn spawn_starvation_detector(&mut self, scheduler: Arc<Mutex<FairScheduler>>, period: Duration) {
        let (tx, mut rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let events = scheduler.lock().check_starvation();
                        for event in events {
                            warn!(
                                tenant_id = %event.tenant_id,
                                tier = ?event.tier,
                                p95_wait_ms = event.p95_wait.as_millis() as u64,
                                "lifecycle: starvation detected, weight boosted"
                            );
                        }
                    }
                    _ = &mut rx => break,
                }
            }
        });
        self.starvation = Some((tx, handle));
    }

    pub fn probes(&self) -> HealthProbes {
        self.probes.clone()
    }

    pub fn observation_sink(&self) -> Arc<ObservationSink> {
        Arc::clone(&self.observation_sink)
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Runs each startup stage via `init` in spec-mandated order. `init`
    /// returning `Err` aborts the whole sequence (spec §4.10: "Unhealthy
    /// startup aborts with a diagnostic").
    pub async fn start<F, Fut>(&mut self, mut init: F) -> Result<()>
    where
        F: FnMut(StartupStage) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for stage in StartupStage::ORDER {
            info!(stage = stage.name(), "lifecycle: starting stage");
            init(stage).await.map_err(|err| {
                error!(stage = stage.name(), error = %err, "lifecycle: startup stage failed");
                Error::StartupFailed(format!("{}: {err}", stage.name()))
            })?;
        }
        self.probes.mark_started();
        self.probes.set_accepting_traffic(true);
        self.phase = LifecyclePhase::Ready;
        info!("lifecycle: startup complete, accepting traffic");
        Ok(())
    }

    /// Deadline-bounded draining shutdown (spec §4.10 steps 1-5). Each
    /// provided closure performs one step; `drain_sessions` and
    /// `cancel_and_close` are each bounded by their proportional slice of
    /// `shutdown.drain_timeout_ms` (default split 40/30/30).
    pub async fn shutdown<F1, Fut1, F2, Fut2>(
        &mut self,
        drain_sessions: F1,
        cancel_and_close: F2,
    ) -> Result<()>
    where
        F1: FnOnce() -> Fut1,
        Fut1: Future<Output = ()>,
        F2: FnOnce() -> Fut2,
        Fut2: Future<Output = ()>,
    {
        self.phase = LifecyclePhase::Draining;
        self.probes.set_accepting_traffic(false);
        info!("lifecycle: draining, refusing new sessions");

        let total = Duration::from_millis(self.config.shutdown.drain_timeout_ms);
        let (p1, p2, p3) = self.config.shutdown.phase_split;
        let refuse_deadline = total.mul_f64(p1 as f64 / 100.0);
        let drain_deadline = total.mul_f64(p2 as f64 / 100.0);
        let close_deadline = total.mul_f64(p3 as f64 / 100.0);

        // Step 1 is synchronous (flag flip above); its slice is a grace
        // period for in-flight admission checks to observe the flag.
        tokio::time::sleep(refuse_deadline.min(Duration::from_millis(50))).await;

        if timeout(drain_deadline, drain_sessions()).await.is_err() {
            warn!("lifecycle: session drain exceeded its deadline, proceeding to cancel");
        }

        let close_result = timeout(close_deadline, cancel_and_close()).await;

        if let Some((starvation_tx, starvation_handle)) = self.starvation.take() {
            let _ = starvation_tx.send(());
            let _ = starvation_handle.await;
        }

        if let Some((flush_tx, flush_handle)) = self.flush.take() {
            let _ = flush_tx.send(());
            let _ = flush_handle.await;
        } else {
            // `spawn_observation_flush` was never called (e.g. a test that
            // exercises shutdown in isolation); still guarantee the buffer
            // is flushed before shutdown completes (spec §4.10 step 4).
            flush_once(&self.observation_sink, |_| {}, self.observation_port.as_deref());
        }

        if close_result.is_err() {
            warn!("lifecycle: cancel/close step exceeded its deadline, hard-exiting");
            self.phase = LifecyclePhase::Stopped;
            self.probes.mark_not_live();
            return Err(Error::ShutdownTimedOut);
        }
        self.phase = LifecyclePhase::Stopped;
        self.probes.mark_not_live();
        info!("lifecycle: shutdown complete");
        Ok(())
    }
}

/// Builds the Observation → bandit-posterior feedback callback for
/// `spawn_observation_flush` (spec §2 "updates feed back to Routing Engine
/// and Health tracker"; spec §4.5 "Reward computation"). The Observation
/// record carries no per-request SLO of its own, so the adapter's
/// `estimated_latency_ms` stands in for it when scoring the latency term.
pub fn bandit_feedback(routing: Arc<RoutingEngine>) -> impl FnMut(&Observation) + Send + 'static {
    move |observation: &Observation| {
        let cost_normalized = if observation.estimated_cost_micros == 0 {
            0.0
        } else {
            (observation.actual_cost_micros as f64 / observation.estimated_cost_micros as f64).min(1.0)
        };
        let reward = atp_routing::reward::compute_reward(
            atp_routing::reward::RewardWeights::default(),
            observation.success,
            observation.quality_score.unwrap_or(0.5),
            observation.actual_latency_ms,
            observation.estimated_latency_ms,
            cost_normalized,
            observation.error_code.as_deref(),
        );
        routing.update(&observation.adapter_id, reward);
    }
}

/// Resolves once SIGTERM or SIGINT (Ctrl-C) is received, matching
/// `dashflow-registry::api::server`'s own shutdown-signal future.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
