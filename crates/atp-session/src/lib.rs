//! Per-session state: the state machine, fragment reassembly, sequencing,
//! ACK batching, heartbeat liveness, anti-replay, and handshake negotiation
//! that sits directly on top of the wire types in `atp-protocol`.

pub mod ack;
pub mod budget;
pub mod errors;
pub mod handshake;
pub mod heartbeat;
pub mod reassembly;
pub mod replay;
pub mod sequence;
pub mod session;

pub use budget::Budget;
pub use errors::{Error, Result};
pub use session::{IngestOutcome, Session, SessionConfig, SessionState};
