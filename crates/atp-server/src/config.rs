//! `AtpConfig`: the full configuration surface of spec §6, loaded from TOML
//! and overridable by `ATP_`-prefixed environment variables, the same shape
//! `dashflow`'s own config loading and `dashflow-streaming::env_vars` use.
//! `Default` is implemented by hand for every nested struct so the
//! documented defaults (spec §5, §6) live next to the types.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub max_frame_bytes: usize,
    pub heartbeat_interval_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self { max_frame_bytes: 1 << 20, heartbeat_interval_ms: 15_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_missed_heartbeats: u32,
    pub anti_replay_window_ms: u64,
    pub handshake_timeout_ms: u64,
    pub ack_delay_ms: u64,
    pub gap_timer_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_missed_heartbeats: 3,
            anti_replay_window_ms: 60_000,
            handshake_timeout_ms: 2_000,
            ack_delay_ms: 20,
            gap_timer_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantWeightsConfig {
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

impl Default for TenantWeightsConfig {
    fn default() -> Self {
        Self { gold: 8, silver: 4, bronze: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfigSurface {
    pub tenant_weights: TenantWeightsConfig,
    pub queue_high_watermark_ms: u64,
    pub queue_low_watermark_ms: u64,
    pub starvation_p95_threshold_ms: u64,
    pub global_concurrency_cap: u32,
    pub per_tenant_concurrency_cap: u32,
}

impl Default for SchedulerConfigSurface {
    fn default() -> Self {
        Self {
            tenant_weights: TenantWeightsConfig::default(),
            queue_high_watermark_ms: 5_000,
            queue_low_watermark_ms: 1_000,
            starvation_p95_threshold_ms: 5_000,
            global_concurrency_cap: 1024,
            per_tenant_concurrency_cap: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub aimd_alpha_tokens: u64,
    pub aimd_beta: f64,
    pub min_window_tokens: u64,
    pub min_window_parallel: u32,
    pub min_window_usd_micros: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            aimd_alpha_tokens: 512,
            aimd_beta: 0.5,
            min_window_tokens: 256,
            min_window_parallel: 1,
            min_window_usd_micros: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: String,
    pub weight_quality: f64,
    pub weight_latency: f64,
    pub weight_cost: f64,
    pub weight_carbon: f64,
    pub shadow_probability: f64,
    pub promotion_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: "thompson".to_string(),
            weight_quality: 0.4,
            weight_latency: 0.2,
            weight_cost: 0.3,
            weight_carbon: 0.1,
            shadow_probability: 0.05,
            promotion_threshold: 0.55,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfigSurface {
    pub f_max: u32,
    pub r_max: f64,
    pub cooldown_initial_ms: u64,
    pub cooldown_max_ms: u64,
}

impl Default for BreakerConfigSurface {
    fn default() -> Self {
        Self { f_max: 5, r_max: 0.5, cooldown_initial_ms: 2_000, cooldown_max_ms: 60_000 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub drain_timeout_ms: u64,
    /// Percentage split of `drain_timeout_ms` across the three drain phases
    /// (spec §4.10: "default 30 s split 40/30/30").
    pub phase_split: (u8, u8, u8),
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_ms: 30_000, phase_split: (40, 30, 30) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtpConfig {
    pub protocol: ProtocolConfig,
    pub session: SessionConfig,
    pub scheduler: SchedulerConfigSurface,
    pub flow: FlowConfig,
    pub routing: RoutingConfig,
    pub breaker: BreakerConfigSurface,
    pub shutdown: ShutdownConfig,
    pub bind_addr: String,
}

impl Default for AtpConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            session: SessionConfig::default(),
            scheduler: SchedulerConfigSurface::default(),
            flow: FlowConfig::default(),
            routing: RoutingConfig::default(),
            breaker: BreakerConfigSurface::default(),
            shutdown: ShutdownConfig::default(),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AtpConfig {
    /// Parse a TOML document into `AtpConfig`, then overlay `ATP_`-prefixed
    /// environment variables (e.g. `ATP_BIND_ADDR`) on top, matching
    /// `dashflow-streaming::env_vars`'s override precedence.
    pub fn load(toml_source: &str) -> Result<Self> {
        let mut config: AtpConfig = toml::from_str(toml_source).map_err(Error::TomlParse)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("ATP_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(value) = std::env::var("ATP_PROTOCOL_MAX_FRAME_BYTES") {
            if let Ok(parsed) = value.parse() {
                self.protocol.max_frame_bytes = parsed;
            }
        }
        if let Ok(value) = std::env::var("ATP_ROUTING_STRATEGY") {
            self.routing.strategy = value;
        }
        if let Ok(value) = std::env::var("ATP_SHUTDOWN_DRAIN_TIMEOUT_MS") {
            if let Ok(parsed) = value.parse() {
                self.shutdown.drain_timeout_ms = parsed;
            }
        }
    }

    /// Fail-fast validation before the Lifecycle Coordinator begins wiring
    /// services (spec §10.5 "Config validation at startup").
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.queue_low_watermark_ms >= self.scheduler.queue_high_watermark_ms {
            return Err(Error::InvalidConfig(
                "scheduler.queue_low_watermark_ms must be less than queue_high_watermark_ms".to_string(),
            ));
        }
        if self.breaker.cooldown_initial_ms > self.breaker.cooldown_max_ms {
            return Err(Error::InvalidConfig(
                "breaker.cooldown_initial_ms must not exceed breaker.cooldown_max_ms".to_string(),
            ));
        }
        let (a, b, c) = self.shutdown.phase_split;
        if a as u16 + b as u16 + c as u16 != 100 {
            return Err(Error::InvalidConfig("shutdown.phase_split must sum to 100".to_string()));
        }
        if !matches!(self.routing.strategy.as_str(), "thompson" | "ucb" | "greedy") {
            return Err(Error::InvalidConfig(format!("unknown routing.strategy: {}", self.routing.strategy)));
        }
        if self.scheduler.per_tenant_concurrency_cap > self.scheduler.global_concurrency_cap {
            return Err(Error::InvalidConfig(
                "scheduler.per_tenant_concurrency_cap must not exceed global_concurrency_cap".to_string(),
            ));
        }
        Ok(())
    }
}
