//! Relay configuration

use dialback_transport::{RelayTarget, TargetError};
use std::fmt;
use std::time::Duration;

/// Default bound on a single dial attempt
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings resolved once at startup and handed to the relay loop
#[derive(Clone)]
pub struct RelayConfig {
    /// Listener to dial back to
    pub target: RelayTarget,

    /// Shared connection key; empty when none was supplied
    pub connection_key: String,

    /// Bound on each dial attempt (zero = unbounded)
    pub timeout: Duration,

    /// Delay between attempts (zero = stop after the first failure)
    pub reconnect_after: Duration,

    /// Skip verification of the listener's certificate
    pub insecure: bool,
}

impl RelayConfig {
    pub fn new(target: RelayTarget) -> Self {
        Self {
            target,
            connection_key: String::new(),
            timeout: DEFAULT_DIAL_TIMEOUT,
            reconnect_after: Duration::ZERO,
            insecure: false,
        }
    }

    /// Build a config from a user-supplied address, applying the default port
    pub fn from_address(address: &str) -> Result<Self, TargetError> {
        Ok(Self::new(address.parse()?))
    }

    pub fn with_connection_key(mut self, key: impl Into<String>) -> Self {
        self.connection_key = key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reconnect_after(mut self, delay: Duration) -> Self {
        self.reconnect_after = delay;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn reconnects(&self) -> bool {
        !self.reconnect_after.is_zero()
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.connection_key.is_empty() {
            "<none>"
        } else {
            "<redacted>"
        };

        f.debug_struct("RelayConfig")
            .field("target", &self.target)
            .field("connection_key", &key)
            .field("timeout", &self.timeout)
            .field("reconnect_after", &self.reconnect_after)
            .field("insecure", &self.insecure)
            .finish()
    }
}
