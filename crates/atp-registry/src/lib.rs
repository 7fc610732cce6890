//! Adapter capability registry, EWMA health tracking, readiness gating, and
//! per-adapter circuit breakers (spec §4.3, §4.4).
//!
//! This crate owns everything the Routing Engine needs to know about a
//! candidate adapter *before* a request is dispatched: what it advertises,
//! how healthy it has recently been, and whether its breaker currently
//! allows traffic. It does not score or rank adapters for a specific
//! request — that is `atp-routing`'s job; this crate only answers "is
//! `adapter_id` ready, and which adapters are compatible at all".

pub mod breaker;
pub mod capability;
pub mod errors;
pub mod health;
pub mod registry;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use capability::{AdapterCapability, CapabilityRequest};
pub use errors::{Error, Result};
pub use health::{HealthConfig, HealthRecord};
pub use registry::{AdapterEntry, AdapterRegistry, ReadinessConfig, RegistrySnapshot};
