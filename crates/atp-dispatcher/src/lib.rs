//! Dispatch of admitted requests to adapters, with shadow challenger
//! execution and Observation emission (spec §4.8).

pub mod dispatch;
pub mod errors;
pub mod ports;
pub mod quality;

pub use dispatch::{DispatchReport, DispatchRequest, Dispatcher, DispatcherConfig};
pub use errors::{Error, Result};
pub use ports::{AdapterEstimate, AdapterPort, DispatchContext, FragmentEvent};
pub use quality::QualityPort;
