//! Server-role yamux session

use crate::{MuxConfig, MuxError, MuxResult, MuxSession, MuxStream};
use async_trait::async_trait;
use std::future::poll_fn;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::debug;
use yamux::{Connection, Mode};

/// yamux session owning the transport connection it runs over
pub struct YamuxSession<T> {
    session_id: String,
    connection: Option<Connection<Compat<T>>>,
}

impl<T> std::fmt::Debug for YamuxSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamuxSession")
            .field("session_id", &self.session_id)
            .field("closed", &self.connection.is_none())
            .finish()
    }
}

impl<T> YamuxSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start a server-role session over `io`
    pub fn server(io: T, config: &MuxConfig) -> Self {
        let session_id = format!("mux-{}", uuid::Uuid::new_v4());
        debug!("[{}] Starting yamux server session", session_id);

        Self {
            session_id,
            connection: Some(Connection::new(
                io.compat(),
                config.to_yamux(),
                Mode::Server,
            )),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl<T> MuxSession for YamuxSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = MuxStream;

    async fn accept_stream(&mut self) -> MuxResult<Option<MuxStream>> {
        let connection = self.connection.as_mut().ok_or(MuxError::Closed)?;

        match poll_fn(|cx| connection.poll_next_inbound(cx)).await {
            Some(Ok(stream)) => {
                debug!("[{}] Accepted stream {}", self.session_id, stream.id());
                Ok(Some(stream.compat()))
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                debug!("[{}] Peer closed the session", self.session_id);
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> MuxResult<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        let result = poll_fn(|cx| connection.poll_close(cx)).await;
        // Dropping the connection releases the transport even if the close handshake failed
        drop(connection);

        debug!("[{}] Session closed", self.session_id);
        result.map_err(Into::into)
    }

    fn is_closed(&self) -> bool {
        self.connection.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn_client;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_accepts_streams_opened_by_client() {
        let (relay_io, listener_io) = tokio::io::duplex(64 * 1024);
        let mut session = YamuxSession::server(relay_io, &MuxConfig::default());
        let (opener, driver) = spawn_client(listener_io, &MuxConfig::default());

        let client = tokio::spawn(async move {
            let mut stream = opener.open().await.unwrap();
            stream.write_all(b"hello").await.unwrap();
            stream.shutdown().await.unwrap();
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).await.unwrap();
            reply
        });

        let mut accepted = session.accept_stream().await.unwrap().unwrap();
        let mut buf = [0u8; 5];

        // The session must keep being polled for the stream to make progress
        let echo = async {
            accepted.read_exact(&mut buf).await.unwrap();
            accepted.write_all(&buf).await.unwrap();
            accepted.shutdown().await.unwrap();
        };
        tokio::select! {
            _ = echo => {}
            _ = session.accept_stream() => panic!("unexpected session event"),
        }

        // Keep driving until the client has read the echo and hung up
        let drive = async { while let Ok(Some(_)) = session.accept_stream().await {} };
        let (reply, _) = tokio::join!(client, drive);

        assert_eq!(reply.unwrap(), b"hello");
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (relay_io, _listener_io) = tokio::io::duplex(1024);
        let mut session = YamuxSession::server(relay_io, &MuxConfig::default());

        assert!(!session.is_closed());
        let _ = session.close().await;
        assert!(session.is_closed());
        assert!(session.close().await.is_ok());
        assert!(matches!(
            session.accept_stream().await,
            Err(MuxError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_peer_hangup_ends_session() {
        let (relay_io, listener_io) = tokio::io::duplex(1024);
        let mut session = YamuxSession::server(relay_io, &MuxConfig::default());
        drop(listener_io);

        assert!(matches!(session.accept_stream().await, Ok(None) | Err(_)));
    }
}
