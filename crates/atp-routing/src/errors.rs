use atp_protocol::AtpErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// No adapter survives the constraint filter (spec §4.5 "Output").
    #[error("no feasible adapter for request {request_id}")]
    NoFeasibleAdapter { request_id: String },

    #[error("unknown selection strategy: {0}")]
    UnknownStrategy(String),
}

impl From<&Error> for AtpErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::NoFeasibleAdapter { .. } => AtpErrorCode::EAdapter,
            Error::UnknownStrategy(_) => AtpErrorCode::EInternal,
        }
    }
}
