use dialback_mux::MuxError;
use dialback_transport::{DialError, TargetError, TlsConfigError};
use thiserror::Error;

/// Failure while serving a multiplexed session
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("multiplexed session: {0}")]
    Session(#[from] MuxError),
}

/// Terminal relay error; the message names the failing stage
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("build TLS config: {0}")]
    Config(#[from] TlsConfigError),

    #[error("dial: {0}")]
    Dial(#[from] DialError),

    #[error("serve: {0}")]
    Serve(#[from] ServeError),

    #[error("invalid address: {0}")]
    Target(#[from] TargetError),
}

pub type RelayResult<T> = Result<T, RelayError>;
