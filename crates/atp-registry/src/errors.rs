use atp_protocol::AtpErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("capability schema invalid for adapter {adapter_id}: {reason}")]
    InvalidCapability { adapter_id: String, reason: String },

    #[error("no adapter registered under id {0}")]
    NotFound(String),

    #[error("no compatible adapter satisfies the request")]
    NoCompatibleAdapter,

    #[error("circuit breaker open for adapter {0}")]
    CircuitOpen(String),
}

impl From<&Error> for AtpErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidCapability { .. } => AtpErrorCode::EInternal,
            Error::NotFound(_) | Error::NoCompatibleAdapter => AtpErrorCode::EAdapter,
            Error::CircuitOpen(_) => AtpErrorCode::ECircuit,
        }
    }
}
