//! Session-local errors. Collapsed to [`atp_protocol::AtpErrorCode`] at the
//! point a `TaxonomyError` needs to leave the crate (e.g. onto an ERROR or
//! FIN frame).

use atp_protocol::AtpErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("handshake failed: no common {0} between offer and accept")]
    HandshakeNoCommonFeature(&'static str),

    #[error("identity rejected by auth port")]
    AuthRejected,

    #[error("sequence gap on stream {stream_id}: expected {expected}, received {received}")]
    SequenceGap { stream_id: String, expected: u64, received: u64 },

    #[error("duplicate msg_seq {sequence} on stream {stream_id}")]
    SequenceDuplicate { stream_id: String, sequence: u64 },

    #[error("reassembly buffer for stream {stream_id} exceeded {limit} ({what})")]
    ReassemblyOverflow { stream_id: String, what: &'static str, limit: usize },

    #[error("gap timer expired for stream {stream_id} at msg_seq {msg_seq}")]
    GapTimerExpired { stream_id: String, msg_seq: u64 },

    #[error("replayed nonce {0}")]
    ReplayedNonce(String),

    #[error("session idle: {0} consecutive heartbeats missed")]
    Idle(u32),

    #[error("data_scope {scope} not in tenant-allowed set")]
    ScopeNotAllowed { scope: String },

    #[error("session is not in a state that permits this operation: {0}")]
    InvalidState(&'static str),
}

impl From<&Error> for AtpErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::HandshakeNoCommonFeature(_) => AtpErrorCode::EAuth,
            Error::AuthRejected => AtpErrorCode::EAuth,
            Error::SequenceGap { .. } | Error::SequenceDuplicate { .. } => AtpErrorCode::ESeqRetry,
            Error::ReassemblyOverflow { .. } => AtpErrorCode::ESeqRetry,
            Error::GapTimerExpired { .. } => AtpErrorCode::ESeqRetry,
            Error::ReplayedNonce(_) => AtpErrorCode::EReplay,
            Error::Idle(_) => AtpErrorCode::EIdle,
            Error::ScopeNotAllowed { .. } => AtpErrorCode::EScope,
            Error::InvalidState(_) => AtpErrorCode::EInternal,
        }
    }
}
