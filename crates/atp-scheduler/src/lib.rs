//! QoS-aware fair scheduler (weighted deficit round-robin with
//! preemption) and AIMD flow controller (spec §4.6, §4.7).

pub mod errors;
pub mod fair;
pub mod flow;

pub use errors::{Error, Result};
pub use fair::{AdmitOutcome, FairScheduler, QueuedRequest, SchedulerConfig, StarvationEvent, TenantWeights};
pub use flow::{AimdConfig, CongestionSignal, FlowController, FlowControllerRegistry};
