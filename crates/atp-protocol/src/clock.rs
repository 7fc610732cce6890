//! Clock and ID generation ports. Abstracted behind traits so session,
//! scheduler, and dispatcher logic can be driven by a fake clock/deterministic
//! ID source in tests, matching the `TestClock`/`FixedRandomId` harness style
//! used throughout the teacher's own test-utils.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Wall-clock and monotonic-ish time source. Implementations must be cheap
/// to call — it is read on every frame send/receive.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// ID generation for sessions, streams, correlation IDs, and nonces.
pub trait RandomId: Send + Sync {
    fn new_id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl RandomId for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Milliseconds since the Unix epoch, used where a raw timestamp (rather than
/// a `DateTime`) is convenient, e.g. `Heartbeat.sent_at_ms`.
pub fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
