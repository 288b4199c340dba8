//! Dial, bridge and reconnect cycle

use crate::bridge::{SessionServer, TransportBridge};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use dialback_transport::{build_client_tls_config, Dialer, RelayTarget, TlsDialer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where the relay loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Dialing,
    Bridging,
    Sleeping,
    Done,
    Failed,
}

/// Progress notifications emitted by [`RelayLoop`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    StateChanged(RelayState),
    Connected(SocketAddr),
    AttemptFailed(String),
    Reconnecting(Duration),
}

/// Repeated dial and serve cycles against a single listener
///
/// With a zero reconnect delay the first outcome ends the loop. Otherwise
/// every failure is reported and the loop waits the constant delay before
/// dialing again, indefinitely; a clean session end reconnects as well.
pub struct RelayLoop<D, S> {
    dialer: D,
    server: S,
    target: RelayTarget,
    reconnect_after: Duration,
    state: RelayState,
    events: Option<mpsc::UnboundedSender<RelayEvent>>,
}

impl RelayLoop<TlsDialer, TransportBridge> {
    /// Resolve TLS settings from `config` and build the production loop
    pub fn from_config(config: RelayConfig) -> RelayResult<Self> {
        let tls = build_client_tls_config(&config.connection_key, config.insecure)?;
        let dialer = TlsDialer::new(&tls, config.timeout);

        Ok(Self::new(
            dialer,
            TransportBridge::default(),
            config.target,
            config.reconnect_after,
        ))
    }
}

impl<D, S> RelayLoop<D, S>
where
    D: Dialer,
    S: SessionServer<D::Connection>,
{
    pub fn new(dialer: D, server: S, target: RelayTarget, reconnect_after: Duration) -> Self {
        Self {
            dialer,
            server,
            target,
            reconnect_after,
            state: RelayState::Idle,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RelayEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Run until a terminal outcome; never returns while reconnecting is enabled
    pub async fn run(&mut self) -> RelayResult<()> {
        loop {
            let outcome = self.attempt().await;

            if self.reconnect_after.is_zero() {
                return match outcome {
                    Ok(()) => {
                        self.set_state(RelayState::Done);
                        Ok(())
                    }
                    Err(e) => {
                        self.set_state(RelayState::Failed);
                        Err(e)
                    }
                };
            }

            match outcome {
                Ok(()) => debug!("Session with {} ended", self.target),
                Err(e) => {
                    warn!("error: {}", e);
                    self.emit(RelayEvent::AttemptFailed(e.to_string()));
                }
            }

            info!(
                "reconnecting after {}",
                humantime::format_duration(self.reconnect_after)
            );
            self.emit(RelayEvent::Reconnecting(self.reconnect_after));
            self.set_state(RelayState::Sleeping);
            tokio::time::sleep(self.reconnect_after).await;
        }
    }

    /// One dial followed by serving the session until it ends
    async fn attempt(&mut self) -> RelayResult<()> {
        self.set_state(RelayState::Dialing);
        let established = self.dialer.dial(&self.target).await?;

        info!("connected to {}", established.remote_addr);
        self.emit(RelayEvent::Connected(established.remote_addr));

        self.set_state(RelayState::Bridging);
        self.server
            .serve(established.connection)
            .await
            .map_err(RelayError::from)
    }

    fn set_state(&mut self, state: RelayState) {
        if self.state != state {
            debug!("Relay state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(RelayEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Build the relay from `config` and run it to completion
pub async fn run_relay(config: RelayConfig) -> RelayResult<()> {
    RelayLoop::from_config(config)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServeError;
    use async_trait::async_trait;
    use dialback_mux::MuxError;
    use dialback_transport::{DialError, Established};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Dialer double following a script of outcomes; `true` means success
    struct ScriptedDialer {
        script: Mutex<Vec<bool>>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    impl ScriptedDialer {
        fn new(script: Vec<bool>) -> (Self, Arc<Mutex<Vec<Instant>>>) {
            let attempts = Arc::new(Mutex::new(Vec::new()));
            let dialer = Self {
                script: Mutex::new(script.into_iter().rev().collect()),
                attempts: attempts.clone(),
            };
            (dialer, attempts)
        }

        fn always_failing() -> (Self, Arc<Mutex<Vec<Instant>>>) {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        type Connection = ();

        async fn dial(&self, _target: &RelayTarget) -> Result<Established<()>, DialError> {
            self.attempts.lock().unwrap().push(Instant::now());
            let succeed = self.script.lock().unwrap().pop().unwrap_or(false);

            if succeed {
                Ok(Established {
                    connection: (),
                    remote_addr: "127.0.0.1:4080".parse().unwrap(),
                })
            } else {
                Err(DialError::Connect(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            }
        }
    }

    /// Session server double returning a fixed outcome
    struct FixedServer {
        fail: bool,
        served: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl SessionServer<()> for FixedServer {
        async fn serve(&self, _connection: ()) -> Result<(), ServeError> {
            *self.served.lock().unwrap() += 1;
            if self.fail {
                Err(ServeError::Session(MuxError::Closed))
            } else {
                Ok(())
            }
        }
    }

    fn server(fail: bool) -> (FixedServer, Arc<Mutex<usize>>) {
        let served = Arc::new(Mutex::new(0));
        (
            FixedServer {
                fail,
                served: served.clone(),
            },
            served,
        )
    }

    fn target() -> RelayTarget {
        RelayTarget::new("listener.example", 4080)
    }

    #[tokio::test]
    async fn test_dial_failure_without_reconnect_is_terminal() {
        let (dialer, attempts) = ScriptedDialer::always_failing();
        let (server, served) = server(false);
        let mut relay = RelayLoop::new(dialer, server, target(), Duration::ZERO);

        let err = relay.run().await.unwrap_err();

        assert!(matches!(err, RelayError::Dial(DialError::Connect(_))));
        assert!(err.to_string().starts_with("dial:"));
        assert_eq!(attempts.lock().unwrap().len(), 1);
        assert_eq!(*served.lock().unwrap(), 0);
        assert_eq!(relay.state(), RelayState::Failed);
    }

    #[tokio::test]
    async fn test_serve_failure_without_reconnect_is_terminal() {
        let (dialer, attempts) = ScriptedDialer::new(vec![true]);
        let (server, served) = server(true);
        let mut relay = RelayLoop::new(dialer, server, target(), Duration::ZERO);

        let err = relay.run().await.unwrap_err();

        assert!(matches!(err, RelayError::Serve(_)));
        assert!(err.to_string().starts_with("serve:"));
        assert_eq!(attempts.lock().unwrap().len(), 1);
        assert_eq!(*served.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clean_end_without_reconnect_is_done() {
        let (dialer, _) = ScriptedDialer::new(vec![true]);
        let (server, _) = server(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = RelayLoop::new(dialer, server, target(), Duration::ZERO).with_events(tx);

        relay.run().await.unwrap();
        drop(relay);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                RelayEvent::StateChanged(RelayState::Dialing),
                RelayEvent::Connected("127.0.0.1:4080".parse().unwrap()),
                RelayEvent::StateChanged(RelayState::Bridging),
                RelayEvent::StateChanged(RelayState::Done),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_with_reconnect_keep_loop_alive() {
        let delay = Duration::from_secs(3);
        let (dialer, attempts) = ScriptedDialer::always_failing();
        let (server, _) = server(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = RelayLoop::new(dialer, server, target(), delay).with_events(tx);

        let handle = tokio::spawn(async move { relay.run().await });

        let mut reported = 0;
        while reported < 4 {
            match rx.recv().await.unwrap() {
                RelayEvent::AttemptFailed(message) => {
                    assert!(message.starts_with("dial:"));
                    reported += 1;
                }
                RelayEvent::Reconnecting(after) => assert_eq!(after, delay),
                _ => {}
            }
        }

        assert!(!handle.is_finished());
        handle.abort();

        let attempts = attempts.lock().unwrap();
        assert!(attempts.len() >= 4);
        for pair in attempts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= delay && gap < delay + Duration::from_millis(10),
                "gap {:?}",
                gap
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_end_with_reconnect_dials_again() {
        let delay = Duration::from_secs(1);
        let (dialer, attempts) = ScriptedDialer::new(vec![true, true]);
        let (server, served) = server(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = RelayLoop::new(dialer, server, target(), delay).with_events(tx);

        let handle = tokio::spawn(async move { relay.run().await });

        let mut connects = 0;
        while connects < 2 {
            if let RelayEvent::Connected(_) = rx.recv().await.unwrap() {
                connects += 1;
            }
        }
        // Third attempt fails, proving the loop went round again
        loop {
            if let RelayEvent::AttemptFailed(_) = rx.recv().await.unwrap() {
                break;
            }
        }
        handle.abort();

        assert!(attempts.lock().unwrap().len() >= 3);
        assert_eq!(*served.lock().unwrap(), 2);
    }
}
