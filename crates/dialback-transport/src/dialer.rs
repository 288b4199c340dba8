//! Single-attempt TLS dialing

use crate::target::RelayTarget;
use crate::tls::ClientTlsConfig;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DialError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error("TLS handshake: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("invalid server name '{0}'")]
    InvalidServerName(String),
}

/// A freshly established connection and the address it reached
#[derive(Debug)]
pub struct Established<C> {
    pub connection: C,
    pub remote_addr: SocketAddr,
}

/// One outbound connection attempt; retrying is the caller's business
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: Send + 'static;

    async fn dial(&self, target: &RelayTarget) -> Result<Established<Self::Connection>, DialError>;
}

/// Dials the listener over TCP and performs the TLS handshake
pub struct TlsDialer {
    connector: TlsConnector,
    server_name: Option<ServerName<'static>>,
    timeout: Duration,
}

impl std::fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsDialer")
            .field("server_name", &self.server_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TlsDialer {
    /// A zero `timeout` leaves the attempt unbounded
    pub fn new(tls: &ClientTlsConfig, timeout: Duration) -> Self {
        Self {
            connector: TlsConnector::from(tls.rustls_config()),
            server_name: tls.server_name_override().cloned(),
            timeout,
        }
    }

    async fn connect(
        &self,
        target: &RelayTarget,
    ) -> Result<Established<TlsStream<TcpStream>>, DialError> {
        let server_name = match &self.server_name {
            Some(name) => name.clone(),
            None => ServerName::try_from(target.host().to_string())
                .map_err(|_| DialError::InvalidServerName(target.host().to_string()))?,
        };

        debug!("Dialing {} ({:?})", target, server_name);

        let tcp_stream = TcpStream::connect((target.host(), target.port()))
            .await
            .map_err(DialError::Connect)?;
        let remote_addr = tcp_stream.peer_addr().map_err(DialError::Connect)?;

        let tls_stream = self
            .connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(DialError::Handshake)?;

        debug!("TLS established with {}", remote_addr);

        Ok(Established {
            connection: tls_stream,
            remote_addr,
        })
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    type Connection = TlsStream<TcpStream>;

    async fn dial(&self, target: &RelayTarget) -> Result<Established<Self::Connection>, DialError> {
        if self.timeout.is_zero() {
            return self.connect(target).await;
        }

        tokio::time::timeout(self.timeout, self.connect(target))
            .await
            .map_err(|_| DialError::Timeout(self.timeout))?
    }
}
