//! Stream multiplexing over a single relay connection
//!
//! The relay runs the yamux *server* role even though it dialed the TCP
//! connection: the listener opens streams, the relay accepts them.
//!
//! - [`YamuxSession`]: server-role session implementing [`MuxSession`]
//! - [`spawn_client`]: client-role driver returning a [`StreamOpener`], used by
//!   listeners (and tests) to open streams toward a relay

pub mod opener;
pub mod session;

pub use opener::{spawn_client, StreamOpener};
pub use session::YamuxSession;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// A logical stream carried by a yamux session, adapted to tokio I/O traits
pub type MuxStream = tokio_util::compat::Compat<yamux::Stream>;

pub type MuxResult<T> = Result<T, MuxError>;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("multiplexer connection: {0}")]
    Connection(#[from] yamux::ConnectionError),

    #[error("multiplexer session closed")]
    Closed,
}

/// Multiplexer settings
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Maximum number of concurrent streams per session
    pub max_num_streams: usize,

    /// Largest frame body sent at once
    pub split_send_size: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_num_streams: 256,
            split_send_size: 16 * 1024,
        }
    }
}

impl MuxConfig {
    pub fn with_max_streams(mut self, max: usize) -> Self {
        self.max_num_streams = max;
        self
    }

    pub(crate) fn to_yamux(&self) -> yamux::Config {
        let mut config = yamux::Config::default();
        config.set_max_num_streams(self.max_num_streams);
        config.set_split_send_size(self.split_send_size);
        config
    }
}

/// Server side of a multiplexed session: hands out streams the peer opens
#[async_trait]
pub trait MuxSession: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Next stream opened by the peer; `None` once the peer has closed the session
    async fn accept_stream(&mut self) -> MuxResult<Option<Self::Stream>>;

    /// Close the session and release the underlying connection
    async fn close(&mut self) -> MuxResult<()>;

    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mux_config_default() {
        let config = MuxConfig::default();
        assert_eq!(config.max_num_streams, 256);
        assert_eq!(config.split_send_size, 16 * 1024);
    }

    #[test]
    fn test_mux_config_builder() {
        let config = MuxConfig::default().with_max_streams(8);
        assert_eq!(config.max_num_streams, 8);
    }
}
