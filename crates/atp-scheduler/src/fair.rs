//! Fair Scheduler (spec §4.6): per-tenant QoS queues, weighted deficit
//! round-robin, starvation-aware weight boosting, admission, and
//! preemption.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use atp_protocol::QosTier;
use atp_session::Budget;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tenant_weights: TenantWeights,
    pub queue_high_watermark: usize,
    pub queue_low_watermark: usize,
    pub starvation_p95_threshold: Duration,
    pub global_concurrency_cap: u32,
    pub per_tenant_concurrency_cap: u32,
    /// Minimum silver wait before silver is allowed to preempt bronze (spec
    /// §4.6 "Silver can preempt bronze only when silver wait exceeds a
    /// configured threshold").
    pub silver_preempt_wait_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tenant_weights: TenantWeights::default(),
            queue_high_watermark: 256,
            queue_low_watermark: 64,
            starvation_p95_threshold: Duration::from_secs(5),
            global_concurrency_cap: 1024,
            per_tenant_concurrency_cap: 64,
            silver_preempt_wait_threshold: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TenantWeights {
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

impl Default for TenantWeights {
    fn default() -> Self {
        Self { gold: 8, silver: 4, bronze: 1 }
    }
}

impl TenantWeights {
    pub fn weight_for(&self, tier: QosTier) -> u32 {
        match tier {
            QosTier::Gold => self.gold,
            QosTier::Silver => self.silver,
            QosTier::Bronze => self.bronze,
        }
    }
}

/// One item sitting in a per-tenant/per-tier FIFO queue.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request_id: String,
    pub session_id: String,
    pub tenant_id: String,
    pub qos: QosTier,
    pub estimated_tokens: u64,
    pub estimated_usd_micros: u64,
    pub enqueued_at: Instant,
}

struct TenantQueues {
    gold: VecDeque<QueuedRequest>,
    silver: VecDeque<QueuedRequest>,
    bronze: VecDeque<QueuedRequest>,
    deficit: u32,
    /// Temporary weight boost applied when this tenant/tier is starving
    /// (spec §4.6 "starvation detector").
    weight_boost: u32,
    in_flight: u32,
    wait_samples: VecDeque<Duration>,
}

impl Default for TenantQueues {
    fn default() -> Self {
        Self {
            gold: VecDeque::new(),
            silver: VecDeque::new(),
            bronze: VecDeque::new(),
            deficit: 0,
            weight_boost: 0,
            in_flight: 0,
            wait_samples: VecDeque::new(),
        }
    }
}

impl TenantQueues {
    fn queue_mut(&mut self, tier: QosTier) -> &mut VecDeque<QueuedRequest> {
        match tier {
            QosTier::Gold => &mut self.gold,
            QosTier::Silver => &mut self.silver,
            QosTier::Bronze => &mut self.bronze,
        }
    }

    fn total_depth(&self) -> usize {
        self.gold.len() + self.silver.len() + self.bronze.len()
    }

    fn record_wait(&mut self, wait: Duration) {
        self.wait_samples.push_back(wait);
        if self.wait_samples.len() > 200 {
            self.wait_samples.pop_front();
        }
    }

    /// p95 over recorded wait samples, 0 if none recorded yet.
    fn p95_wait(&self) -> Duration {
        if self.wait_samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = self.wait_samples.iter().copied().collect();
        sorted.sort();
        let idx = ((sorted.len() as f64) * 0.95).floor() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// A bronze (or, past threshold, silver) request was preempted to make
    /// room (spec §4.6 "Preemption").
    AdmittedWithPreemption { preempted_request_id: String },
}

/// Event emitted when a tenant/tier's weight gets boosted for starvation
/// (spec §4.6: "emits a 'starvation' event").
#[derive(Debug, Clone)]
pub struct StarvationEvent {
    pub tenant_id: String,
    pub tier: QosTier,
    pub p95_wait: Duration,
}

pub struct FairScheduler {
    config: SchedulerConfig,
    tenants: HashMap<String, TenantQueues>,
    global_in_flight: u32,
    preemptions_total: u64,
}

impl FairScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config, tenants: HashMap::new(), global_in_flight: 0, preemptions_total: 0 }
    }

    pub fn preemptions_total(&self) -> u64 {
        self.preemptions_total
    }

    pub fn enqueue(&mut self, request: QueuedRequest) -> Result<()> {
        let depth = self.tenants.entry(request.tenant_id.clone()).or_default().total_depth();
        if depth >= self.config.queue_high_watermark {
            return Err(Error::Busy { depth, high_watermark: self.config.queue_high_watermark });
        }
        let tenant = self.tenants.entry(request.tenant_id.clone()).or_default();
        tenant.queue_mut(request.qos).push_back(request);
        Ok(())
    }

    /// Run the starvation detector: for every tenant/tier whose p95 wait
    /// exceeds the configured threshold, boost its weight and emit an
    /// event (spec §4.6).
    pub fn check_starvation(&mut self) -> Vec<StarvationEvent> {
        let mut events = Vec::new();
        for (tenant_id, queues) in self.tenants.iter_mut() {
            let p95 = queues.p95_wait();
            if p95 > self.config.starvation_p95_threshold {
                queues.weight_boost = queues.weight_boost.saturating_add(4);
                events.push(StarvationEvent { tenant_id: tenant_id.clone(), tier: QosTier::Bronze, p95_wait: p95 });
            } else {
                queues.weight_boost = 0;
            }
        }
        events
    }

    fn effective_weight(&self, tenant: &TenantQueues, tier: QosTier) -> u32 {
        self.config.tenant_weights.weight_for(tier) + tenant.weight_boost
    }

    /// Admission preflight: session triplet window (inner gate) then
    /// global/tenant concurrency and queue watermark (outer gate), per
    /// spec §9's resolution of the session-window-vs-tenant-cap question.
    pub fn try_admit(&mut self, tenant_id: &str, budget: &mut Budget, tokens: u64, usd_micros: u64) -> Result<()> {
        if !budget.reserve(tokens, usd_micros) {
            return Err(Error::WindowExceeded { what: "tokens_or_usd" });
        }
        if self.global_in_flight >= self.config.global_concurrency_cap {
            budget.release(tokens, usd_micros);
            return Err(Error::GlobalConcurrencyCapped(self.config.global_concurrency_cap));
        }
        let tenant = self.tenants.entry(tenant_id.to_string()).or_default();
        if tenant.in_flight >= self.config.per_tenant_concurrency_cap {
            budget.release(tokens, usd_micros);
            return Err(Error::TenantConcurrencyCapped(self.config.per_tenant_concurrency_cap));
        }
        tenant.in_flight += 1;
        self.global_in_flight += 1;
        Ok(())
    }

    /// Admission entry point for the live request path: preflight the
    /// session triplet window, then global/tenant concurrency (spec §9's
    /// resolution of the window-vs-tenant-cap question); a gold request
    /// denied purely on concurrency (not budget) falls through to
    /// preemption instead of failing outright (spec §4.6 "Preemption").
    /// Callers are expected to have already `enqueue`d and then `drr_pop`ed
    /// this request so it doesn't sit orphaned in its tenant's queue.
    pub fn admit(&mut self, tenant_id: &str, qos: QosTier, budget: &mut Budget, tokens: u64, usd_micros: u64) -> Result<AdmitOutcome> {
        match self.try_admit(tenant_id, budget, tokens, usd_micros) {
            Ok(()) => Ok(AdmitOutcome::Admitted),
            Err(Error::GlobalConcurrencyCapped(_) | Error::TenantConcurrencyCapped(_)) if qos == QosTier::Gold => {
                if !budget.reserve(tokens, usd_micros) {
                    return Err(Error::WindowExceeded { what: "tokens_or_usd" });
                }
                match self.admit_gold_with_preemption(tenant_id) {
                    Ok(outcome) => Ok(outcome),
                    Err(err) => {
                        budget.release(tokens, usd_micros);
                        Err(err)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    /// In-flight (admitted, not yet released) count for a tenant, used by
    /// callers layering their own AIMD-driven concurrency ceiling on top of
    /// the static `per_tenant_concurrency_cap` (spec §4.7).
    pub fn in_flight(&self, tenant_id: &str) -> u32 {
        self.tenants.get(tenant_id).map_or(0, |t| t.in_flight)
    }

    pub fn release_admission(&mut self, tenant_id: &str) {
        if let Some(tenant) = self.tenants.get_mut(tenant_id) {
            tenant.in_flight = tenant.in_flight.saturating_sub(1);
        }
        self.global_in_flight = self.global_in_flight.saturating_sub(1);
    }

    /// Admit a gold request at full concurrency by preempting the
    /// oldest in-flight bronze (or, once its wait exceeds the configured
    /// threshold, silver) request from some other tenant. Gold itself is
    /// never preempted (spec §4.6).
    pub fn admit_gold_with_preemption(&mut self, gold_tenant_id: &str) -> Result<AdmitOutcome> {
        if self.global_in_flight < self.config.global_concurrency_cap {
            self.global_in_flight += 1;
            self.tenants.entry(gold_tenant_id.to_string()).or_default().in_flight += 1;
            return Ok(AdmitOutcome::Admitted);
        }

        if let Some((victim_tenant, victim_request_id)) = self.oldest_preemptible() {
            if let Some(queues) = self.tenants.get_mut(&victim_tenant) {
                queues.in_flight = queues.in_flight.saturating_sub(1);
            }
            self.preemptions_total += 1;
            self.tenants.entry(gold_tenant_id.to_string()).or_default().in_flight += 1;
            return Ok(AdmitOutcome::AdmittedWithPreemption { preempted_request_id: victim_request_id });
        }

        Err(Error::GlobalConcurrencyCapped(self.config.global_concurrency_cap))
    }

    /// Oldest-first bronze victim across all tenants; falls back to the
    /// oldest silver only once that tenant's silver wait has crossed
    /// `silver_preempt_wait_threshold`.
    fn oldest_preemptible(&self) -> Option<(String, String)> {
        let mut bronze_candidate: Option<(Instant, String, String)> = None;
        for (tenant_id, queues) in self.tenants.iter() {
            if queues.in_flight > 0 {
                if let Some(oldest) = queues.bronze.front() {
                    let is_older = bronze_candidate.as_ref().map(|(t, _, _)| oldest.enqueued_at < *t).unwrap_or(true);
                    if is_older {
                        bronze_candidate =
                            Some((oldest.enqueued_at, tenant_id.clone(), oldest.request_id.clone()));
                    }
                }
            }
        }
        if let Some((_, tenant, req)) = bronze_candidate {
            return Some((tenant, req));
        }

        for (tenant_id, queues) in self.tenants.iter() {
            if queues.in_flight > 0 && queues.p95_wait() > self.config.silver_preempt_wait_threshold {
                if let Some(oldest) = queues.silver.front() {
                    return Some((tenant_id.clone(), oldest.request_id.clone()));
                }
            }
        }
        None
    }

    /// Jain's fairness index over per-tenant served throughput (spec
    /// §4.6). Informational only — the scheduler does not target it
    /// directly.
    pub fn jains_index(throughputs: &[f64]) -> f64 {
        if throughputs.is_empty() {
            return 1.0;
        }
        let sum: f64 = throughputs.iter().sum();
        let sum_sq: f64 = throughputs.iter().map(|x| x * x).sum();
        if sum_sq == 0.0 {
            return 1.0;
        }
        (sum * sum) / (throughputs.len() as f64 * sum_sq)
    }

    pub fn record_wait(&mut self, tenant_id: &str, wait: Duration) {
        self.tenants.entry(tenant_id.to_string()).or_default().record_wait(wait);
    }

    /// Deficit-round-robin pop: advances each tenant's deficit counter by
    /// its effective weight and dequeues from the highest-priority
    /// non-empty queue once its deficit covers one unit of work.
    pub fn drr_pop(&mut self, tenant_id: &str) -> Option<QueuedRequest> {
        let tenant = self.tenants.get_mut(tenant_id)?;
        for tier in [QosTier::Gold, QosTier::Silver, QosTier::Bronze] {
            let weight = self.config.tenant_weights.weight_for(tier) + tenant.weight_boost;
            tenant.deficit = tenant.deficit.saturating_add(weight);
            if tenant.deficit > 0 {
                if let Some(item) = tenant.queue_mut(tier).pop_front() {
                    tenant.deficit = tenant.deficit.saturating_sub(1);
                    return Some(item);
                }
            }
        }
        None
    }
}
