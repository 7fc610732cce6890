//! The Lifecycle Coordinator, external ports, and the administrative HTTP
//! surface (spec §4.10, §6): the piece that wires every other crate's
//! services together into one process and answers the minimal `/v1/ask`,
//! `/v1/plan`, `/v1/observe`, and health-probe endpoints.

pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod ports;

pub use config::AtpConfig;
pub use errors::{Error, Result};
pub use http::{router, AppState};
pub use lifecycle::{HealthProbes, LifecycleCoordinator, LifecyclePhase, StartupStage};
pub use ports::{AuthPort, PolicyPort, SecretsPort};
