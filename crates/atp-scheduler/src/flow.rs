//! Flow Controller (spec §4.7): AIMD window adjustment, ECN advisories,
//! and the WINDOW_UPDATE emission policy.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use atp_protocol::Window;

#[derive(Debug, Clone, Copy)]
pub struct AimdConfig {
    /// Additive increase applied per successful interval.
    pub increase_tokens: u64,
    pub increase_usd_micros: u64,
    pub increase_parallel: u32,
    /// Multiplicative decrease factor applied on congestion signal
    /// (spec §4.7: β = 0.5).
    pub decrease_factor: f64,
    /// Floor the window never shrinks below.
    pub floor: Window,
    /// Ceiling from the negotiated/effective window.
    pub ceiling: Window,
    /// Emit a WINDOW_UPDATE once any component moves by more than this
    /// fraction since the last emission.
    pub emit_relative_delta: f64,
    /// ...or at least this often, even with no material delta.
    pub emit_interval: Duration,
    /// Grace period after a BUSY-driven cut before another multiplicative
    /// decrease is allowed to fire (spec §4.7).
    pub busy_grace_period: Duration,
    /// Starting window for a tenant with no prior AIMD history.
    pub initial: Window,
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            increase_tokens: 512,
            increase_usd_micros: 1_000,
            increase_parallel: 1,
            decrease_factor: 0.5,
            floor: Window::new(1, 256, 500),
            ceiling: Window::new(32, 1_000_000, 10_000_000),
            emit_relative_delta: 0.1,
            emit_interval: Duration::from_millis(250),
            busy_grace_period: Duration::from_millis(200),
            initial: Window::new(4, 8_192, 10_000),
        }
    }
}

/// Congestion signals that drive a multiplicative decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionSignal {
    Ecn,
    LatencyOverSlo,
    Busy,
}

pub struct FlowController {
    config: AimdConfig,
    current: Window,
    last_emitted: Window,
    last_emitted_at: Instant,
    last_busy_decrease_at: Option<Instant>,
}

impl FlowController {
    pub fn new(config: AimdConfig, initial: Window) -> Self {
        let now = Instant::now();
        Self { config, current: initial, last_emitted: initial, last_emitted_at: now, last_busy_decrease_at: None }
    }

    pub fn current(&self) -> Window {
        self.current
    }

    /// Additive increase applied once per healthy interval, clamped to the
    /// configured ceiling (spec §4.7 "AIMD additive increase").
    pub fn on_healthy_interval(&mut self) {
        let candidate = Window::new(
            self.current.max_parallel + self.config.increase_parallel,
            self.current.max_tokens + self.config.increase_tokens,
            self.current.max_usd_micros + self.config.increase_usd_micros,
        );
        self.current = candidate.component_min(&self.config.ceiling);
    }

    /// Apply a multiplicative decrease in response to a congestion signal,
    /// floored at the configured minimum. BUSY-triggered cuts respect a
    /// grace period so repeated BUSY statuses don't collapse the window
    /// to the floor in one round trip (spec §4.7).
    pub fn on_congestion(&mut self, signal: CongestionSignal, now: Instant) -> bool {
        if signal == CongestionSignal::Busy {
            if let Some(last) = self.last_busy_decrease_at {
                if now.duration_since(last) < self.config.busy_grace_period {
                    return false;
                }
            }
            self.last_busy_decrease_at = Some(now);
        }

        let factor = self.config.decrease_factor;
        let scaled = Window::new(
            scale_u32(self.current.max_parallel, factor),
            scale_u64(self.current.max_tokens, factor),
            scale_u64(self.current.max_usd_micros, factor),
        );
        self.current = Window::new(
            scaled.max_parallel.max(self.config.floor.max_parallel),
            scaled.max_tokens.max(self.config.floor.max_tokens),
            scaled.max_usd_micros.max(self.config.floor.max_usd_micros),
        );
        true
    }

    /// Apply the agent-suggested window as `min(router W, agent W)` (spec
    /// §4.7's "effective window" rule), clamped to the floor.
    pub fn apply_agent_suggestion(&mut self, suggested: Window) {
        let merged = self.current.component_min(&suggested);
        self.current = Window::new(
            merged.max_parallel.max(self.config.floor.max_parallel),
            merged.max_tokens.max(self.config.floor.max_tokens),
            merged.max_usd_micros.max(self.config.floor.max_usd_micros),
        );
    }

    /// Whether a WINDOW_UPDATE frame should be emitted now: either the
    /// window moved materially since the last emission, or the periodic
    /// interval elapsed (spec §4.7 "WINDOW_UPDATE emission policy").
    pub fn should_emit(&self, now: Instant) -> bool {
        let delta = self.current.relative_delta(&self.last_emitted);
        delta > self.config.emit_relative_delta || now.duration_since(self.last_emitted_at) >= self.config.emit_interval
    }

    pub fn mark_emitted(&mut self, now: Instant) {
        self.last_emitted = self.current;
        self.last_emitted_at = now;
    }
}

/// Per-tenant AIMD state (spec §4.7), keyed the way the Fair Scheduler keys
/// its queues so each tenant's outstanding window evolves independently of
/// every other tenant's.
pub struct FlowControllerRegistry {
    config: AimdConfig,
    controllers: HashMap<String, FlowController>,
}

impl FlowControllerRegistry {
    pub fn new(config: AimdConfig) -> Self {
        Self { config, controllers: HashMap::new() }
    }

    fn controller_mut(&mut self, tenant_id: &str) -> &mut FlowController {
        let config = self.config;
        self.controllers
            .entry(tenant_id.to_string())
            .or_insert_with(|| FlowController::new(config, config.initial))
    }

    /// The tenant's current AIMD-controlled window, creating it at
    /// `config.initial` on first use. Read-only: does not itself trigger
    /// AIMD growth or decay.
    pub fn current_window(&mut self, tenant_id: &str) -> Window {
        self.controller_mut(tenant_id).current()
    }

    /// Fold in a window the caller itself suggests as a ceiling (spec
    /// §4.7's "effective window = min(router W, agent W)"), narrowing the
    /// tenant's AIMD window to at most what was suggested.
    pub fn apply_agent_suggestion(&mut self, tenant_id: &str, suggested: Window) -> Window {
        let controller = self.controller_mut(tenant_id);
        controller.apply_agent_suggestion(suggested);
        controller.current()
    }

    pub fn record_success(&mut self, tenant_id: &str) {
        self.controller_mut(tenant_id).on_healthy_interval();
    }

    pub fn record_congestion(&mut self, tenant_id: &str, signal: CongestionSignal, now: Instant) {
        self.controller_mut(tenant_id).on_congestion(signal, now);
    }

    /// The window to advertise via WINDOW_UPDATE if the emission policy
    /// says it's due, marking it emitted in the same step (spec §4.7).
    pub fn window_update_due(&mut self, tenant_id: &str, now: Instant) -> Option<Window> {
        let controller = self.controller_mut(tenant_id);
        if controller.should_emit(now) {
            controller.mark_emitted(now);
            Some(controller.current())
        } else {
            None
        }
    }
}

fn scale_u32(value: u32, factor: f64) -> u32 {
    ((value as f64) * factor).round() as u32
}

fn scale_u64(value: u64, factor: f64) -> u64 {
    ((value as f64) * factor).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_increase_grows_all_components() {
        let mut controller = FlowController::new(AimdConfig::default(), Window::new(2, 1_000, 2_000));
        controller.on_healthy_interval();
        let window = controller.current();
        assert_eq!(window.max_parallel, 3);
        assert_eq!(window.max_tokens, 1_512);
        assert_eq!(window.max_usd_micros, 3_000);
    }

    #[test]
    fn additive_increase_clamps_to_ceiling() {
        let config = AimdConfig { ceiling: Window::new(4, 1_200, 2_500), ..Default::default() };
        let mut controller = FlowController::new(config, Window::new(4, 1_000, 2_000));
        controller.on_healthy_interval();
        let window = controller.current();
        assert_eq!(window.max_parallel, 4);
        assert_eq!(window.max_tokens, 1_200);
    }

    #[test]
    fn ecn_triggers_multiplicative_decrease_floored_at_minimum() {
        let mut controller = FlowController::new(AimdConfig::default(), Window::new(8, 4_000, 8_000));
        let now = Instant::now();
        assert!(controller.on_congestion(CongestionSignal::Ecn, now));
        let window = controller.current();
        assert_eq!(window.max_parallel, 4);
        assert_eq!(window.max_tokens, 2_000);
        assert_eq!(window.max_usd_micros, 4_000);
    }

    #[test]
    fn busy_decrease_respects_grace_period() {
        let mut controller = FlowController::new(AimdConfig::default(), Window::new(8, 4_000, 8_000));
        let t0 = Instant::now();
        assert!(controller.on_congestion(CongestionSignal::Busy, t0));
        let before = controller.current();
        assert!(!controller.on_congestion(CongestionSignal::Busy, t0 + Duration::from_millis(10)));
        assert_eq!(controller.current(), before);
    }

    #[test]
    fn should_emit_on_material_delta() {
        let mut controller = FlowController::new(AimdConfig::default(), Window::new(2, 1_000, 2_000));
        let now = Instant::now();
        assert!(!controller.should_emit(now));
        controller.on_healthy_interval();
        controller.on_healthy_interval();
        controller.on_healthy_interval();
        assert!(controller.should_emit(now));
    }

    #[test]
    fn should_emit_on_periodic_interval_even_without_delta() {
        let config = AimdConfig { emit_interval: Duration::from_millis(1), ..Default::default() };
        let controller = FlowController::new(config, Window::new(2, 1_000, 2_000));
        let later = Instant::now() + Duration::from_millis(5);
        assert!(controller.should_emit(later));
    }

    #[test]
    fn registry_tracks_independent_windows_per_tenant() {
        let mut registry = FlowControllerRegistry::new(AimdConfig::default());
        let requested = Window::new(8, 100_000, 100_000);
        let a = registry.apply_agent_suggestion("tenant-a", requested);
        assert_eq!(a, AimdConfig::default().initial.component_min(&requested));

        registry.record_congestion("tenant-b", CongestionSignal::Ecn, Instant::now());
        let b = registry.apply_agent_suggestion("tenant-b", requested);
        assert!(b.max_tokens < a.max_tokens, "tenant-b's congestion should not affect tenant-a's window");
    }

    #[test]
    fn registry_window_update_due_follows_emission_policy() {
        let mut registry = FlowControllerRegistry::new(AimdConfig::default());
        let now = Instant::now();
        registry.apply_agent_suggestion("t1", Window::new(8, 4_000, 8_000));
        assert!(registry.window_update_due("t1", now).is_none());
        registry.record_success("t1");
        registry.record_success("t1");
        registry.record_success("t1");
        assert!(registry.window_update_due("t1", now).is_some());
        assert!(registry.window_update_due("t1", now).is_none());
    }

    #[test]
    fn agent_suggestion_is_component_wise_min() {
        let mut controller = FlowController::new(AimdConfig::default(), Window::new(8, 4_000, 8_000));
        controller.apply_agent_suggestion(Window::new(2, 10_000, 1_000));
        let window = controller.current();
        assert_eq!(window.max_parallel, 2);
        assert_eq!(window.max_tokens, 4_000);
        assert_eq!(window.max_usd_micros, 1_000);
    }
}
