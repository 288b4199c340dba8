//! SOCKS5 server for relayed streams
//!
//! Implements the CONNECT command of RFC 1928 with the NO AUTHENTICATION
//! method on any byte stream, so it can run directly on multiplexed streams
//! without binding a local port. BIND and UDP ASSOCIATE are answered with
//! "command not supported".

pub mod proto;
pub mod server;

pub use proto::{Command, Reply, TargetAddr};
pub use server::Socks5Server;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SocksError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported SOCKS version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("client offered no acceptable authentication method")]
    NoAcceptableMethod,

    #[error("unsupported command {0:?}")]
    UnsupportedCommand(Command),

    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),

    #[error("invalid domain name in request")]
    InvalidDomain,

    #[error("connect to {target}: {source}")]
    Connect {
        target: TargetAddr,
        #[source]
        source: std::io::Error,
    },
}

pub type SocksResult<T> = Result<T, SocksError>;
