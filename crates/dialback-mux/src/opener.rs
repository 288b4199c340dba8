//! Client-role yamux driver
//!
//! A yamux connection only makes progress while it is polled, so the client
//! side runs on its own task and takes open requests over a channel. The
//! session closes once every [`StreamOpener`] has been dropped.

use crate::{MuxConfig, MuxError, MuxResult, MuxStream};
use std::collections::VecDeque;
use std::future::poll_fn;
use std::task::Poll;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::debug;
use yamux::{Connection, Mode};

type OpenReply = oneshot::Sender<MuxResult<MuxStream>>;

/// Handle for opening streams on a client-role session
#[derive(Debug, Clone)]
pub struct StreamOpener {
    requests: mpsc::Sender<OpenReply>,
}

impl StreamOpener {
    pub async fn open(&self) -> MuxResult<MuxStream> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .await
            .map_err(|_| MuxError::Closed)?;
        reply_rx.await.map_err(|_| MuxError::Closed)?
    }
}

/// Run a client-role session over `io` on a background task
pub fn spawn_client<T>(io: T, config: &MuxConfig) -> (StreamOpener, JoinHandle<MuxResult<()>>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut connection = Connection::new(io.compat(), config.to_yamux(), Mode::Client);
    let (requests_tx, mut requests_rx) = mpsc::channel::<OpenReply>(16);

    let driver = tokio::spawn(async move {
        let mut pending: VecDeque<OpenReply> = VecDeque::new();
        let mut accepting_requests = true;

        poll_fn(|cx| {
            while accepting_requests {
                match requests_rx.poll_recv(cx) {
                    Poll::Ready(Some(reply)) => pending.push_back(reply),
                    Poll::Ready(None) => accepting_requests = false,
                    Poll::Pending => break,
                }
            }

            while !pending.is_empty() {
                match connection.poll_new_outbound(cx) {
                    Poll::Ready(Ok(stream)) => {
                        debug!("Opened stream {}", stream.id());
                        if let Some(reply) = pending.pop_front() {
                            let _ = reply.send(Ok(stream.compat()));
                        }
                    }
                    Poll::Ready(Err(e)) => {
                        if let Some(reply) = pending.pop_front() {
                            let _ = reply.send(Err(MuxError::Closed));
                        }
                        return Poll::Ready(Err(MuxError::from(e)));
                    }
                    Poll::Pending => break,
                }
            }

            if !accepting_requests && pending.is_empty() {
                return connection.poll_close(cx).map_err(MuxError::from);
            }

            // Drives all session I/O; the relay side never opens streams
            loop {
                match connection.poll_next_inbound(cx) {
                    Poll::Ready(Some(Ok(stream))) => {
                        debug!("Dropping unexpected inbound stream {}", stream.id());
                    }
                    Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(MuxError::from(e))),
                    Poll::Ready(None) => return Poll::Ready(Ok(())),
                    Poll::Pending => return Poll::Pending,
                }
            }
        })
        .await
    });

    (
        StreamOpener {
            requests: requests_tx,
        },
        driver,
    )
}
