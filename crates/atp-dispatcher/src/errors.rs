use atp_protocol::AtpErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("adapter circuit breaker is open for {adapter_id}")]
    CircuitOpen { adapter_id: String },

    #[error("per-hop TTL exhausted")]
    TtlExhausted,

    #[error("budget exhausted before dispatch: {what}")]
    BudgetExhausted { what: &'static str },

    #[error("adapter {adapter_id} failed: {message}")]
    AdapterFailed { adapter_id: String, message: String },

    #[error("dispatch deadline exceeded")]
    DeadlineExceeded,

    #[error("dispatch cancelled")]
    Cancelled,

    #[error("no failover adapter available")]
    NoFailover,
}

impl From<&Error> for AtpErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::CircuitOpen { .. } => AtpErrorCode::ECircuit,
            Error::TtlExhausted => AtpErrorCode::EScope,
            Error::BudgetExhausted { .. } => AtpErrorCode::EWindow,
            Error::AdapterFailed { .. } | Error::NoFailover => AtpErrorCode::EAdapter,
            Error::DeadlineExceeded => AtpErrorCode::ETimeout,
            Error::Cancelled => AtpErrorCode::ETimeout,
        }
    }
}
