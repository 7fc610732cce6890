// Error taxonomy for the ATP wire protocol and session boundary.

use thiserror::Error;

/// Codec-local errors. These stay richly typed inside the crate; only the
/// session boundary collapses them into a [`TaxonomyError`] with an
/// [`AtpErrorCode`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The frame could not be parsed from bytes/JSON.
    #[error("malformed frame: {0}")]
    Parse(String),

    /// The checksum stored in the frame does not match the computed one.
    #[error("checksum mismatch: expected 0x{expected:08x}, computed 0x{computed:08x}")]
    Checksum { expected: u32, computed: u32 },

    /// The frame's major protocol version is not supported.
    #[error("unsupported protocol version: found {found}, supported up to {supported}")]
    Version { found: u32, supported: u32 },

    /// Signature verification failed.
    #[error("signature verification failed")]
    Signature,

    /// A caller tried to encode a structurally invalid frame.
    #[error("cannot encode frame: {0}")]
    Encode(String),

    /// The encoded frame exceeds `max_frame_bytes`.
    #[error("frame of {size} bytes exceeds max_frame_bytes ({max})")]
    FrameTooBig { size: usize, max: usize },

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary (de)serialization error.
    #[error("binary codec error: {0}")]
    Binary(#[from] Box<bincode::ErrorKind>),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The session-boundary error taxonomy from spec §4.2/§7. Names are
/// contracts: callers match on `code`, not on crate-internal error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtpErrorCode {
    EParse,
    EChecksum,
    EVersion,
    ESig,
    EReplay,
    EAuth,
    EAuthz,
    ESeqRetry,
    EWindow,
    EPreempt,
    EBusy,
    EIdle,
    ETimeout,
    EScope,
    EAdapter,
    ECircuit,
    EInternal,
}

impl AtpErrorCode {
    /// Whether a caller may retry after receiving this error. Matches the
    /// "retryable" annotation spec.md attaches to each taxonomy entry.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            AtpErrorCode::ESeqRetry
                | AtpErrorCode::EWindow
                | AtpErrorCode::EPreempt
                | AtpErrorCode::EBusy
                | AtpErrorCode::ETimeout
                | AtpErrorCode::EAdapter
                | AtpErrorCode::ECircuit
        )
    }

    /// Whether this error is fatal for the owning session (forces a FIN).
    pub const fn is_session_fatal(self) -> bool {
        matches!(
            self,
            AtpErrorCode::EParse
                | AtpErrorCode::EChecksum
                | AtpErrorCode::EVersion
                | AtpErrorCode::ESig
                | AtpErrorCode::EAuth
                | AtpErrorCode::EAuthz
                | AtpErrorCode::EIdle
                | AtpErrorCode::EScope
                | AtpErrorCode::EInternal
        )
    }
}

/// Wire-facing error carried on `ERROR` frames and returned to administrative
/// callers. `retry_after_ms` is populated only when the emitting component
/// knows a concrete backoff (breaker cooldown, ACK-delay, etc).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaxonomyError {
    pub code: AtpErrorCode,
    pub retryable: bool,
    pub message: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl TaxonomyError {
    pub fn new(code: AtpErrorCode, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            retryable: code.is_retryable(),
            code,
            message: message.into(),
            correlation_id: correlation_id.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }
}

impl From<&Error> for AtpErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Parse(_) => AtpErrorCode::EParse,
            Error::Checksum { .. } => AtpErrorCode::EChecksum,
            Error::Version { .. } => AtpErrorCode::EVersion,
            Error::Signature => AtpErrorCode::ESig,
            Error::Encode(_) => AtpErrorCode::EInternal,
            Error::FrameTooBig { .. } => AtpErrorCode::EParse,
            Error::Json(_) => AtpErrorCode::EParse,
            Error::Binary(_) => AtpErrorCode::EParse,
        }
    }
}
