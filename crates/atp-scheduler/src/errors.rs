use atp_protocol::AtpErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("watermark backpressure: queue depth {depth} >= high watermark {high_watermark}")]
    Busy { depth: usize, high_watermark: usize },

    #[error("triplet window exhausted: {what} would go negative")]
    WindowExceeded { what: &'static str },

    #[error("request preempted by a higher-QoS admission")]
    Preempted,

    #[error("global concurrency cap ({0}) reached")]
    GlobalConcurrencyCapped(u32),

    #[error("per-tenant concurrency cap ({0}) reached")]
    TenantConcurrencyCapped(u32),
}

impl From<&Error> for AtpErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Busy { .. } | Error::GlobalConcurrencyCapped(_) | Error::TenantConcurrencyCapped(_) => {
                AtpErrorCode::EBusy
            }
            Error::WindowExceeded { .. } => AtpErrorCode::EWindow,
            Error::Preempted => AtpErrorCode::EPreempt,
        }
    }
}
