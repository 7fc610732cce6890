use atp_protocol::AtpErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration toml")]
    TomlParse(#[from] toml::de::Error),

    #[error("startup step failed: {0}")]
    StartupFailed(String),

    #[error("shutdown did not complete within the drain deadline")]
    ShutdownTimedOut,

    #[error(transparent)]
    Dispatcher(#[from] atp_dispatcher::Error),

    #[error(transparent)]
    Scheduler(#[from] atp_scheduler::Error),

    #[error(transparent)]
    Observability(#[from] atp_observability::Error),
}

impl Error {
    pub fn code(&self) -> AtpErrorCode {
        match self {
            Error::InvalidConfig(_) | Error::TomlParse(_) => AtpErrorCode::EInternal,
            Error::StartupFailed(_) => AtpErrorCode::EInternal,
            Error::ShutdownTimedOut => AtpErrorCode::ETimeout,
            Error::Dispatcher(_) => AtpErrorCode::EAdapter,
            Error::Scheduler(_) => AtpErrorCode::EBusy,
            Error::Observability(_) => AtpErrorCode::EInternal,
        }
    }
}
