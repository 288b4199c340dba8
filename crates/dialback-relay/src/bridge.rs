//! Hands an established connection to a multiplexed SOCKS5 server

use crate::error::ServeError;
use async_trait::async_trait;
use dialback_mux::{MuxConfig, MuxSession, YamuxSession};
use dialback_socks::Socks5Server;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Serves one established connection until it terminates
#[async_trait]
pub trait SessionServer<C>: Send + Sync {
    async fn serve(&self, connection: C) -> Result<(), ServeError>;
}

/// Runs a server-role yamux session over the connection and a SOCKS5
/// handler on every stream the listener opens
#[derive(Debug, Clone, Default)]
pub struct TransportBridge {
    proxy: Socks5Server,
    mux_config: MuxConfig,
}

impl TransportBridge {
    /// Accept and serve streams until the session ends, then abort the
    /// remaining stream tasks and close the session
    pub async fn serve_session<M>(&self, session: &mut M) -> Result<(), ServeError>
    where
        M: MuxSession,
    {
        let mut streams = JoinSet::new();

        let result = loop {
            tokio::select! {
                accepted = session.accept_stream() => match accepted {
                    Ok(Some(stream)) => {
                        let proxy = self.proxy.clone();
                        streams.spawn(async move {
                            if let Err(e) = proxy.serve_stream(stream).await {
                                debug!("SOCKS stream ended with error: {}", e);
                            }
                        });
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(ServeError::Session(e)),
                },
                Some(joined) = streams.join_next(), if !streams.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!("SOCKS stream task panicked: {}", e);
                        }
                    }
                }
            }
        };

        debug!("Session ended, aborting {} stream task(s)", streams.len());
        streams.shutdown().await;

        if let Err(e) = session.close().await {
            debug!("Error closing multiplexed session: {}", e);
        }

        result
    }
}

#[async_trait]
impl<C> SessionServer<C> for TransportBridge
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn serve(&self, connection: C) -> Result<(), ServeError> {
        let mut session = YamuxSession::server(connection, &self.mux_config);
        debug!(
            "[{}] Serving SOCKS5 over multiplexed session",
            session.session_id()
        );

        // The connection is owned by the session and released when it drops
        self.serve_session(&mut session).await
    }
}
